//! Offline rendering command.

use super::common::{VoiceSpec, linear_to_db, load_instrument, parse_sample, parse_voice};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use voxtree_core::{ChannelId, SoundScope};
use voxtree_io::{BounceOptions, WavSpec, bounce, load_wav_source, write_wav_multi};

#[derive(Args)]
pub struct RenderArgs {
    /// Factory instrument name or instrument file (TOML)
    #[arg(value_name = "INSTRUMENT")]
    instrument: String,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    /// Ticks to render; without it, rendering stops once every voice ends
    #[arg(long)]
    ticks: Option<u64>,

    /// Voice to start, as LINE[:SCOPE] (LINE is an input line or '*')
    #[arg(long = "voice", value_parser = parse_voice)]
    voices: Vec<VoiceSpec>,

    /// Sample for an input line, as LINE=PATH
    #[arg(long = "sample", value_parser = parse_sample)]
    samples: Vec<(usize, PathBuf)>,

    /// Advance voices on a worker pool
    #[arg(long)]
    parallel: bool,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

/// Longest render without `--ticks`, in seconds.
const MAX_SECONDS: usize = 600;

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let mut instrument = load_instrument(&args.instrument)?;
    if args.parallel && instrument.engine.workers < 2 {
        instrument.engine.workers = std::thread::available_parallelism().map_or(2, |n| n.get().max(2));
    }
    let block_size = instrument.engine.block_size;
    let sample_rate = instrument.engine.sample_rate;

    println!("Building {}...", instrument.name);
    let engine = instrument.build_engine()?;

    for (line, path) in &args.samples {
        let spec = load_wav_source(&engine, ChannelId::input(*line), path)?;
        println!(
            "  input[{}] <- {} ({} Hz, {} ch)",
            line,
            path.display(),
            spec.sample_rate,
            spec.channels
        );
        if spec.sample_rate != sample_rate {
            tracing::warn!(
                "sample rate mismatch: {} is {} Hz, engine runs at {} Hz",
                path.display(),
                spec.sample_rate,
                sample_rate
            );
        }
    }

    let voices = if args.voices.is_empty() {
        vec![VoiceSpec {
            line: None,
            scope: SoundScope::PLAYBACK,
        }]
    } else {
        args.voices
    };
    for voice in &voices {
        engine.start_voice(voice.request())?;
        tracing::info!("voice started: {}", voice);
    }

    let options = match args.ticks {
        Some(ticks) => BounceOptions {
            max_frames: ticks as usize * block_size,
            stop_when_idle: false,
        },
        None => BounceOptions {
            max_frames: MAX_SECONDS * sample_rate as usize,
            stop_when_idle: true,
        },
    };

    let pb = ProgressBar::new(options.max_frames.div_ceil(block_size) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ticks ({eta})")?
            .progress_chars("##-"),
    );
    let rendered = bounce(&engine, &options, |_| pb.inc(1));
    pb.finish_and_clear();

    let seconds = rendered.frames() as f32 / sample_rate as f32;
    println!(
        "Rendered {} ticks, {} frames ({:.2}s), {} lines",
        rendered.ticks,
        rendered.frames(),
        seconds,
        rendered.lines.len()
    );
    println!("  Peak {:.1} dB", linear_to_db(rendered.peak()));
    if rendered.failures > 0 {
        tracing::warn!("{} phase hooks failed during the render", rendered.failures);
    }

    let spec = WavSpec {
        channels: rendered.lines.len() as u16,
        sample_rate,
        bits_per_sample: args.bit_depth,
    };
    write_wav_multi(&args.output, &rendered.lines, spec)?;
    tracing::info!("wrote {}", args.output.display());
    println!("Wrote {}", args.output.display());

    Ok(())
}
