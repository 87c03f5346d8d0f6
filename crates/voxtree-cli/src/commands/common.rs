//! Argument parsing shared by the commands.

use anyhow::Context;
use std::path::PathBuf;
use voxtree_config::Instrument;
use voxtree_core::{ChannelId, SoundScope, VoiceRequest};

/// Loads a factory instrument by name, or an instrument file by path.
pub fn load_instrument(name_or_path: &str) -> anyhow::Result<Instrument> {
    Instrument::find(name_or_path)
        .with_context(|| format!("cannot load instrument '{name_or_path}'"))
}

/// A `--voice` argument: `LINE[:SCOPE]`, where `LINE` is an input line or
/// `*` for the whole audio object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSpec {
    /// Input line the voice is restricted to.
    pub line: Option<usize>,
    /// Sound scope of the voice.
    pub scope: SoundScope,
}

impl VoiceSpec {
    /// The engine request for this voice.
    pub fn request(&self) -> VoiceRequest {
        let request = VoiceRequest::new(self.scope);
        match self.line {
            Some(line) => request.channel(ChannelId::input(line)),
            None => request,
        }
    }
}

impl std::fmt::Display for VoiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "input[{line}]:{}", self.scope),
            None => write!(f, "*:{}", self.scope),
        }
    }
}

/// Parses `LINE[:SCOPE]`.
pub fn parse_voice(s: &str) -> Result<VoiceSpec, String> {
    let (line, scope) = match s.split_once(':') {
        Some((line, scope)) => (line, Some(scope)),
        None => (s, None),
    };
    let line = match line.trim() {
        "*" | "all" => None,
        other => Some(
            other
                .parse::<usize>()
                .map_err(|_| format!("invalid voice line '{other}' (expected a number or '*')"))?,
        ),
    };
    let scope = match scope {
        Some(name) => SoundScope::from_name(name.trim())
            .ok_or_else(|| format!("unknown scope '{name}'"))?,
        None => SoundScope::PLAYBACK,
    };
    Ok(VoiceSpec { line, scope })
}

/// Parses `LINE=PATH` for `--sample`.
pub fn parse_sample(s: &str) -> Result<(usize, PathBuf), String> {
    let (line, path) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid sample '{s}' (expected LINE=PATH)"))?;
    let line = line
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid sample line '{line}'"))?;
    Ok((line, PathBuf::from(path)))
}

/// Linear amplitude in dBFS, floored at -120.
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}
