//! Integration tests for voxtree-io WAV I/O and offline rendering.

use voxtree_core::{
    Audio, ChannelId, Engine, EngineConfig, Play, RecallContainer, RecallKind, SoundScope, Stream,
    TemplateBuilder, VoiceRequest,
};
use voxtree_io::{
    BounceOptions, Error, WavFormat, WavSpec, bounce, load_source, load_wav_source, read_wav,
    read_wav_info, read_wav_multi, write_wav, write_wav_multi,
};
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// WAV files
// ---------------------------------------------------------------------------

fn sine_wave(sample_rate: u32, freq_hz: f32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

#[test]
fn wav_roundtrip_mono_i24() {
    let sr = 48000;
    let samples: Vec<f32> = sine_wave(sr, 220.0, 4800).iter().map(|s| s * 0.5).collect();
    let spec = WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 24,
    };

    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &samples, spec).unwrap();

    let (loaded, loaded_spec) = read_wav(file.path()).unwrap();
    assert_eq!(loaded_spec.bits_per_sample, 24);
    assert_eq!(loaded.len(), samples.len());
    for (a, b) in samples.iter().zip(loaded.iter()) {
        assert!((a - b).abs() < 1e-5, "sample mismatch: {a} vs {b}");
    }
}

#[test]
fn wav_info_reports_lines() {
    let lines = vec![vec![0.1; 480], vec![0.2; 480], vec![0.3; 480]];
    let file = NamedTempFile::new().unwrap();
    let spec = WavSpec {
        bits_per_sample: 16,
        ..WavSpec::default()
    };
    write_wav_multi(file.path(), &lines, spec).unwrap();

    let info = read_wav_info(file.path()).unwrap();
    assert_eq!(info.channels, 3);
    assert_eq!(info.num_frames, 480);
    assert_eq!(info.format, WavFormat::Pcm);
    assert!((info.duration_secs - 0.01).abs() < 1e-9);

    let (loaded, _) = read_wav_multi(file.path()).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded[2].iter().all(|s| (s - 0.3).abs() < 1e-3));
}

#[test]
fn wav_write_empty_buffer() {
    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &[], WavSpec::default()).unwrap();
    let (loaded, _) = read_wav(file.path()).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn missing_file_is_an_error() {
    assert!(matches!(
        read_wav("/nonexistent/voxtree.wav"),
        Err(Error::Wav(_))
    ));
}

// ---------------------------------------------------------------------------
// Offline rendering
// ---------------------------------------------------------------------------

fn sampler_engine(block_size: usize) -> Engine {
    let audio = Audio::new(1, 1, 1, 1).unwrap();
    let config = EngineConfig {
        block_size,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, audio).unwrap();
    let container = RecallContainer::new("sampler");
    container.add_template(
        TemplateBuilder::channel("play", ChannelId::input(0), RecallKind::Play(Play))
            .fan_out(RecallKind::Stream(Stream::new(false))),
    );
    engine.add_container(container);
    engine
}

#[test]
fn bounce_renders_until_idle() {
    let engine = sampler_engine(32);
    load_source(&engine, ChannelId::input(0), vec![0.5; 100]).unwrap();
    engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();

    let mut ticks = 0;
    let rendered = bounce(&engine, &BounceOptions::default(), |_| ticks += 1);
    // 100 samples need four 32-frame blocks
    assert_eq!(rendered.ticks, 4);
    assert_eq!(ticks, 4);
    assert_eq!(rendered.frames(), 128);
    assert_eq!(rendered.failures, 0);
    assert!(rendered.lines[0][..100].iter().all(|&s| s == 0.5));
    assert!(rendered.lines[0][100..].iter().all(|&s| s == 0.0));
    assert_eq!(rendered.peak(), 0.5);
}

#[test]
fn bounce_respects_max_frames() {
    let engine = sampler_engine(32);
    load_source(&engine, ChannelId::input(0), vec![0.5; 1000]).unwrap();
    engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();

    let options = BounceOptions {
        max_frames: 50,
        stop_when_idle: true,
    };
    let rendered = bounce(&engine, &options, |_| {});
    assert_eq!(rendered.ticks, 2);
    assert_eq!(rendered.frames(), 50);
    assert_eq!(engine.voices().len(), 1);
}

#[test]
fn wav_source_loads_onto_channel() {
    let file = NamedTempFile::new().unwrap();
    write_wav_multi(file.path(), &[vec![0.5; 64], vec![0.25; 64]], WavSpec::default()).unwrap();

    let engine = sampler_engine(64);
    let spec = load_wav_source(&engine, ChannelId::input(0), file.path()).unwrap();
    assert_eq!(spec.channels, 2);
    let source = engine
        .with_audio(|a| a.channel(ChannelId::input(0)).unwrap().recyclings()[0].source())
        .unwrap();
    assert_eq!(source.len(), 64);
    assert!(source.iter().all(|&s| s == 0.375));

    let err = load_source(&engine, ChannelId::input(3), vec![0.0]).unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
}
