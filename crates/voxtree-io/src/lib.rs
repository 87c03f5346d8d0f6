//! Audio I/O layer for the voxtree engine.
//!
//! This crate provides:
//!
//! - **WAV file I/O**: [`read_wav`], [`read_wav_multi`], [`write_wav`] and
//!   [`write_wav_multi`] for loading and saving audio files
//! - **Sources**: [`load_source`] puts samples behind every recycling of an
//!   input channel
//! - **Offline rendering**: [`bounce`] ticks an [`Engine`](voxtree_core::Engine)
//!   until its voices finish and collects every output line
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voxtree_io::{BounceOptions, bounce, load_wav_source, write_wav_multi};
//!
//! let spec = load_wav_source(&engine, ChannelId::input(0), "kick.wav")?;
//! engine.start_voice(VoiceRequest::new(SoundScope::PLAYBACK))?;
//! let rendered = bounce(&engine, &BounceOptions::default(), |_| {});
//! write_wav_multi("out.wav", &rendered.lines, spec)?;
//! ```

mod bounce;
mod wav;

pub use bounce::{Bounce, BounceOptions, bounce, load_source, load_wav_source};
pub use wav::{
    WavFormat, WavInfo, WavSpec, read_wav, read_wav_info, read_wav_multi, write_wav,
    write_wav_multi,
};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// The engine rejected the request.
    #[error("Engine error: {0}")]
    Engine(#[from] voxtree_core::EngineError),

    /// Output lines of different lengths were passed to a multi-line writer.
    #[error("Line {line} has {len} frames, expected {expected}")]
    RaggedLines {
        /// Offending line.
        line: usize,
        /// Its length.
        len: usize,
        /// Length of line 0.
        expected: usize,
    },

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
