//! Instrument description file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use voxtree_core::{ChannelId, EngineConfig, Orientation};

use crate::error::ConfigError;

/// A complete instrument: engine settings, channel topology and the recall
/// templates grouped into containers.
///
/// # TOML Format
///
/// ```toml
/// name = "Sampler"
/// description = "One-shot playback"
///
/// [engine]
/// block_size = 128
///
/// [audio]
/// audio_channels = 1
/// input_pads = 4
///
/// [[containers]]
/// name = "sampler"
///
/// [[containers.templates]]
/// name = "play"
/// kind = "play"
/// level = "channel"
/// channel = { orientation = "input", line = "*" }
/// child = "stream"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    /// Name of the instrument.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Engine settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Channel topology.
    #[serde(default)]
    pub audio: AudioSection,

    /// Template containers, in registration order.
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

/// `[engine]` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSection {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per tick.
    pub block_size: usize,
    /// Worker threads for parallel ticks.
    pub workers: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            workers: config.workers,
        }
    }
}

impl From<EngineSection> for EngineConfig {
    fn from(section: EngineSection) -> Self {
        Self {
            sample_rate: section.sample_rate,
            block_size: section.block_size,
            workers: section.workers,
        }
    }
}

/// `[audio]` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AudioSection {
    /// Channels per pad.
    pub audio_channels: usize,
    /// Output pads.
    pub output_pads: usize,
    /// Input pads.
    pub input_pads: usize,
    /// Recyclings per channel chain.
    pub recyclings_per_channel: usize,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            audio_channels: 1,
            output_pads: 1,
            input_pads: 1,
            recyclings_per_channel: 1,
        }
    }
}

impl AudioSection {
    /// Lines on one side of the topology.
    pub fn lines(&self, orientation: Orientation) -> usize {
        let pads = match orientation {
            Orientation::Output => self.output_pads,
            Orientation::Input => self.input_pads,
        };
        pads * self.audio_channels
    }
}

/// One `[[containers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerConfig {
    /// Container name.
    pub name: String,
    /// Templates, in declaration order. Dependencies may only point backwards.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

/// Level a template is declared at.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateLevel {
    /// Bound to the whole audio object.
    #[default]
    Audio,
    /// Bound to one channel.
    Channel,
}

/// Side of a channel binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrientationConfig {
    /// Output side.
    Output,
    /// Input side.
    Input,
}

impl From<OrientationConfig> for Orientation {
    fn from(value: OrientationConfig) -> Self {
        match value {
            OrientationConfig::Output => Orientation::Output,
            OrientationConfig::Input => Orientation::Input,
        }
    }
}

/// Line of a channel binding: an index, or `"*"` for one template per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LineSpec {
    /// A single line.
    Index(usize),
    /// `"*"`; anything else is rejected by validation.
    Pattern(String),
}

impl LineSpec {
    /// Returns `true` for the `"*"` wildcard.
    pub fn is_all(&self) -> bool {
        matches!(self, LineSpec::Pattern(p) if p == "*")
    }
}

/// `channel = { orientation, line }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelBinding {
    /// Output or input.
    pub orientation: OrientationConfig,
    /// Line index or `"*"`.
    pub line: LineSpec,
}

impl ChannelBinding {
    /// Binding to a single line.
    pub fn line(orientation: Orientation, line: usize) -> Self {
        Self {
            orientation: orientation.into(),
            line: LineSpec::Index(line),
        }
    }

    /// Binding expanded to every line of `orientation`.
    pub fn all(orientation: Orientation) -> Self {
        Self {
            orientation: orientation.into(),
            line: LineSpec::Pattern("*".into()),
        }
    }

    /// Concrete channels for a topology with `lines` lines on this side.
    pub fn channels(&self, lines: usize) -> Vec<ChannelId> {
        let orientation = Orientation::from(self.orientation);
        let id = |line| ChannelId { orientation, line };
        match &self.line {
            LineSpec::Index(line) => vec![id(*line)],
            spec if spec.is_all() => (0..lines).map(id).collect(),
            LineSpec::Pattern(_) => Vec::new(),
        }
    }
}

impl From<Orientation> for OrientationConfig {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::Output => OrientationConfig::Output,
            Orientation::Input => OrientationConfig::Input,
        }
    }
}

/// `depends = [{ target, outward }]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyConfig {
    /// Name of a template declared earlier in the same container.
    pub target: String,
    /// Also search the parent voice.
    #[serde(default)]
    pub outward: bool,
}

/// One `[[containers.templates]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateConfig {
    /// Template name.
    pub name: String,
    /// Recall kind (`delay-counter`, `beat-counter`, `pattern`, `play`,
    /// `stream`, `volume`).
    pub kind: String,
    /// Audio or channel level.
    #[serde(default)]
    pub level: TemplateLevel,
    /// Channel binding, required at channel level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelBinding>,
    /// Sound scopes; empty means playback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    /// Behavior flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<DependencyConfig>,
    /// Fan-out kind, one child per reachable recycling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
    /// Kind parameters and port values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// Parameters of the fan-out kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub child_params: BTreeMap<String, String>,
}

impl TemplateConfig {
    /// An audio-level template.
    pub fn audio(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            level: TemplateLevel::Audio,
            channel: None,
            scope: Vec::new(),
            flags: Vec::new(),
            depends: Vec::new(),
            child: None,
            params: BTreeMap::new(),
            child_params: BTreeMap::new(),
        }
    }

    /// A channel-level template.
    pub fn channel(name: impl Into<String>, kind: impl Into<String>, binding: ChannelBinding) -> Self {
        Self {
            level: TemplateLevel::Channel,
            channel: Some(binding),
            ..Self::audio(name, kind)
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, target: impl Into<String>, outward: bool) -> Self {
        self.depends.push(DependencyConfig {
            target: target.into(),
            outward,
        });
        self
    }

    /// Set the fan-out kind.
    pub fn with_child(mut self, kind: impl Into<String>) -> Self {
        self.child = Some(kind.into());
        self
    }

    /// Add a flag.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Add a scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope.push(scope.into());
        self
    }

    /// Returns `true` if the binding expands to one template per line.
    pub fn is_expanded(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.line.is_all())
    }
}

impl Instrument {
    /// Create an empty instrument with default sections.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            engine: EngineSection::default(),
            audio: AudioSection::default(),
            containers: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the topology.
    pub fn with_audio(mut self, audio: AudioSection) -> Self {
        self.audio = audio;
        self
    }

    /// Append a container.
    pub fn with_container(mut self, name: impl Into<String>, templates: Vec<TemplateConfig>) -> Self {
        self.containers.push(ContainerConfig {
            name: name.into(),
            templates,
        });
        self
    }

    /// Load an instrument from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let instrument: Instrument = toml::from_str(&content)?;
        tracing::debug!("instrument_load: {} from {}", instrument.name, path.display());
        Ok(instrument)
    }

    /// Load an instrument from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the instrument to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the instrument to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Total template entries across containers, before line expansion.
    pub fn template_count(&self) -> usize {
        self.containers.iter().map(|c| c.templates.len()).sum()
    }

    /// Look up a factory instrument by name, or load `name_or_path` as a file.
    pub fn find(name_or_path: &str) -> Result<Self, ConfigError> {
        if let Some(instrument) = crate::factory::get_factory_instrument(name_or_path) {
            return Ok(instrument);
        }
        let path = Path::new(name_or_path);
        if path.is_file() {
            return Self::load(path);
        }
        Err(ConfigError::InstrumentNotFound(name_or_path.to_owned()))
    }
}
