//! Offline rendering.
//!
//! [`bounce`] drives an [`Engine`] block by block on the calling thread and
//! appends every output line to a buffer, the offline counterpart of a clock
//! calling [`Engine::render`] from an audio callback.

use std::path::Path;
use std::sync::Arc;

use voxtree_core::{ChannelId, Engine, EngineError, Orientation, TickReport};

use crate::{Result, WavSpec, read_wav};

/// When [`bounce`] stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BounceOptions {
    /// Upper bound on rendered frames.
    pub max_frames: usize,
    /// Stop once no voice is active or queued.
    pub stop_when_idle: bool,
}

impl Default for BounceOptions {
    fn default() -> Self {
        Self {
            max_frames: 48_000 * 60,
            stop_when_idle: true,
        }
    }
}

/// Result of [`bounce`].
#[derive(Debug, Clone, Default)]
pub struct Bounce {
    /// One buffer per output line, all the same length.
    pub lines: Vec<Vec<f32>>,
    /// Ticks rendered.
    pub ticks: u64,
    /// Hook failures reported across all ticks.
    pub failures: usize,
}

impl Bounce {
    /// Rendered length in frames.
    pub fn frames(&self) -> usize {
        self.lines.first().map_or(0, Vec::len)
    }

    /// Largest absolute sample over all lines.
    pub fn peak(&self) -> f32 {
        self.lines
            .iter()
            .flatten()
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Renders `engine` until `options` say stop, calling `on_tick` after every
/// block.
///
/// The last block is kept whole when idle detection stops the render, so a
/// voice's final partial block is not cut.
pub fn bounce(engine: &Engine, options: &BounceOptions, mut on_tick: impl FnMut(&TickReport)) -> Bounce {
    let line_count = engine.with_audio(|a| a.lines(Orientation::Output));
    let mut result = Bounce {
        lines: vec![Vec::new(); line_count],
        ..Bounce::default()
    };
    let mut block = vec![Vec::new(); line_count];

    while result.frames() < options.max_frames {
        let report = engine.render(&mut block);
        for (line, samples) in result.lines.iter_mut().zip(&block) {
            line.extend_from_slice(samples);
        }
        result.ticks += 1;
        result.failures += report.failures;
        on_tick(&report);

        if options.stop_when_idle
            && report.active_voices == 0
            && engine.scheduler().pending_commands() == 0
        {
            break;
        }
    }
    for line in &mut result.lines {
        line.truncate(options.max_frames);
    }
    tracing::debug!(
        "bounce: {} ticks, {} frames, {} failures",
        result.ticks,
        result.frames(),
        result.failures
    );
    result
}

/// Puts `samples` behind every recycling of `channel`.
pub fn load_source(engine: &Engine, channel: ChannelId, samples: Vec<f32>) -> Result<()> {
    let source: Arc<[f32]> = samples.into();
    engine.with_audio(|audio| -> Result<()> {
        let chain = audio
            .channel(channel)
            .ok_or(EngineError::ChannelNotFound(channel))?;
        for recycling in chain.recyclings() {
            recycling.set_source(Arc::clone(&source));
        }
        tracing::debug!(
            "load_source: {} samples on {} ({} recyclings)",
            source.len(),
            channel,
            chain.recyclings().len()
        );
        Ok(())
    })
}

/// Reads a WAV file (mixed down to mono) and loads it onto `channel`.
pub fn load_wav_source<P: AsRef<Path>>(
    engine: &Engine,
    channel: ChannelId,
    path: P,
) -> Result<WavSpec> {
    let (samples, spec) = read_wav(path)?;
    load_source(engine, channel, samples)?;
    Ok(spec)
}
