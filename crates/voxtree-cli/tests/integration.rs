//! Integration tests for voxtree-cli.
//!
//! Tests invoke the built `voxtree` binary end to end: listing and validating
//! instruments, inspecting them and rendering to WAV.

use std::process::Command;
use tempfile::TempDir;
use voxtree_io::{WavSpec, read_wav_info, read_wav_multi, write_wav};

/// Helper to get the path to the `voxtree` binary built by cargo.
fn voxtree_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_voxtree"))
}

// ---------------------------------------------------------------------------
// `voxtree instruments`
// ---------------------------------------------------------------------------

#[test]
fn cli_instruments_lists_factory_instruments() {
    let output = voxtree_bin()
        .args(["instruments", "list"])
        .output()
        .expect("failed to run voxtree instruments list");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Factory Instruments"));
    for name in ["sampler", "drum-machine", "mixer"] {
        assert!(stdout.contains(name), "listing should contain '{name}'");
    }
}

#[test]
fn cli_instruments_show_prints_toml() {
    let output = voxtree_bin()
        .args(["instruments", "show", "drum-machine"])
        .output()
        .expect("failed to run voxtree instruments show");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed = voxtree_config::Instrument::from_toml(&stdout).unwrap();
    assert_eq!(parsed.name, "Drum Machine");
}

#[test]
fn cli_instruments_validate_reports_errors() {
    let dir = TempDir::new().unwrap();

    let good = dir.path().join("good.toml");
    voxtree_config::get_factory_instrument("mixer")
        .unwrap()
        .save(&good)
        .unwrap();
    let output = voxtree_bin()
        .args(["instruments", "validate"])
        .arg(&good)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(": ok"));

    let bad = dir.path().join("bad.toml");
    std::fs::write(
        &bad,
        r#"
name = "Bad"

[[containers]]
name = "c"

[[containers.templates]]
name = "t"
kind = "theremin"
"#,
    )
    .unwrap();
    let output = voxtree_bin()
        .args(["instruments", "validate"])
        .arg(&bad)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("unknown kind 'theremin'"));
}

// ---------------------------------------------------------------------------
// `voxtree info`
// ---------------------------------------------------------------------------

#[test]
fn cli_info_shows_templates_and_ports() {
    let output = voxtree_bin()
        .args(["info", "drum-machine"])
        .output()
        .expect("failed to run voxtree info");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Drum Machine"));
    assert!(stdout.contains("Container drums:"));
    assert!(stdout.contains("depends on beats"));
    assert!(stdout.contains("port delay = 23"));
    assert!(stdout.contains("level-2"));
}

#[test]
fn cli_info_unknown_instrument_fails() {
    let output = voxtree_bin()
        .args(["info", "no-such-instrument"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no-such-instrument"));
}

// ---------------------------------------------------------------------------
// `voxtree render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_sampler_until_idle() {
    let dir = TempDir::new().unwrap();
    let sample = dir.path().join("hit.wav");
    let out = dir.path().join("out.wav");
    write_wav(&sample, &vec![0.5; 1000], WavSpec::default()).unwrap();

    let output = voxtree_bin()
        .args(["render", "sampler", "--sample"])
        .arg(format!("0={}", sample.display()))
        .arg("-o")
        .arg(&out)
        .output()
        .expect("failed to run voxtree render");
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let (lines, spec) = read_wav_multi(&out).unwrap();
    assert_eq!(spec.channels, 1);
    assert!(lines[0].len() >= 1000);
    assert!(lines[0].len() < 48_000);
    assert!(lines[0][..1000].iter().all(|&s| s > 0.3));
}

#[test]
fn cli_render_fixed_ticks() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("drums.wav");

    let output = voxtree_bin()
        .args(["render", "drum-machine", "--ticks", "10", "--bit-depth", "16", "-o"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());

    let info = read_wav_info(&out).unwrap();
    assert_eq!(info.num_frames, 10 * 256);
    assert_eq!(info.bits_per_sample, 16);
}

#[test]
fn cli_render_parallel_voices() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("mix.wav");

    let output = voxtree_bin()
        .args([
            "render", "mixer", "--ticks", "4", "--parallel", "--voice", "0", "--voice", "3",
            "-o",
        ])
        .arg(&out)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let info = read_wav_info(&out).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.num_frames, 4 * 256);
}

#[test]
fn cli_render_rejects_bad_voice() {
    let dir = TempDir::new().unwrap();
    let output = voxtree_bin()
        .args(["render", "sampler", "--voice", "left", "-o"])
        .arg(dir.path().join("x.wav"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}
