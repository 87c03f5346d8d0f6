//! Audio / channel topology.
//!
//! An [`Audio`] is one instrument or effect unit. It has `audio_channels`
//! channels per pad and a number of output and input pads; each
//! (orientation, pad, audio channel) triple is a [`Channel`] addressed by its
//! line (`pad * audio_channels + audio_channel`). Every channel owns an ordered
//! chain of [`Recycling`]s.
//!
//! Topology edits (resizing a chain, adding or removing pads, changing the
//! number of audio channels) only touch this structure. The engine then
//! re-derives the recycling spans of live voices from it.

use std::sync::Arc;

use crate::error::EngineError;
use crate::recycling::{Recycling, relink};

/// Direction of a channel relative to its audio object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    /// Channels that produce the audio object's output.
    Output,
    /// Channels that receive input (e.g. one pad per drum sample).
    Input,
}

impl Orientation {
    /// Lowercase name, as used in instrument descriptions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Input => "input",
        }
    }
}

impl core::fmt::Display for Orientation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a channel: orientation plus line index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    /// Output or input side.
    pub orientation: Orientation,
    /// Line index within that side.
    pub line: usize,
}

impl ChannelId {
    /// Output channel at `line`.
    pub const fn output(line: usize) -> Self {
        Self {
            orientation: Orientation::Output,
            line,
        }
    }

    /// Input channel at `line`.
    pub const fn input(line: usize) -> Self {
        Self {
            orientation: Orientation::Input,
            line,
        }
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}[{}]", self.orientation, self.line)
    }
}

/// One line of an audio object and its recycling chain.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    pad: usize,
    audio_channel: usize,
    recyclings: Vec<Arc<Recycling>>,
}

impl Channel {
    fn new(id: ChannelId, pad: usize, audio_channel: usize, recyclings: usize) -> Self {
        let recyclings: Vec<_> = (0..recyclings).map(|_| Recycling::new(id)).collect();
        relink(&recyclings);
        Self {
            id,
            pad,
            audio_channel,
            recyclings,
        }
    }

    /// This channel's address.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Pad index.
    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Audio channel within the pad.
    pub fn audio_channel(&self) -> usize {
        self.audio_channel
    }

    /// The channel's recycling chain, first to last.
    pub fn recyclings(&self) -> &[Arc<Recycling>] {
        &self.recyclings
    }

    /// First recycling of the chain.
    pub fn first_recycling(&self) -> Option<&Arc<Recycling>> {
        self.recyclings.first()
    }

    /// Last recycling of the chain.
    pub fn last_recycling(&self) -> Option<&Arc<Recycling>> {
        self.recyclings.last()
    }

    fn relocate(&mut self, id: ChannelId) {
        self.id = id;
        for recycling in &self.recyclings {
            recycling.set_channel(id);
        }
    }
}

/// Chain of a channel before and after a resize.
#[derive(Debug, Clone)]
pub struct ChainChange {
    /// The resized channel.
    pub channel: ChannelId,
    /// Chain before the resize.
    pub old: Vec<Arc<Recycling>>,
    /// Chain after the resize.
    pub new: Vec<Arc<Recycling>>,
}

/// An instrument or effect unit: channels arranged in pads.
#[derive(Debug)]
pub struct Audio {
    audio_channels: usize,
    recyclings_per_channel: usize,
    outputs: Vec<Channel>,
    inputs: Vec<Channel>,
}

impl Audio {
    /// Creates an audio object with the given counts.
    ///
    /// Every channel starts with `recyclings_per_channel` recyclings.
    pub fn new(
        audio_channels: usize,
        output_pads: usize,
        input_pads: usize,
        recyclings_per_channel: usize,
    ) -> Result<Self, EngineError> {
        if audio_channels == 0 {
            return Err(EngineError::InvalidTopology(
                "audio_channels must be at least 1".into(),
            ));
        }
        if recyclings_per_channel == 0 {
            return Err(EngineError::InvalidTopology(
                "recyclings_per_channel must be at least 1".into(),
            ));
        }
        if output_pads == 0 {
            return Err(EngineError::EmptyOrientation(Orientation::Output));
        }
        let mut audio = Self {
            audio_channels,
            recyclings_per_channel,
            outputs: Vec::new(),
            inputs: Vec::new(),
        };
        audio.grow(Orientation::Output, output_pads);
        audio.grow(Orientation::Input, input_pads);
        Ok(audio)
    }

    /// Channels per pad.
    pub fn audio_channels(&self) -> usize {
        self.audio_channels
    }

    /// Number of pads on the given side.
    pub fn pads(&self, orientation: Orientation) -> usize {
        self.channels(orientation).len() / self.audio_channels
    }

    /// Number of lines (channels) on the given side.
    pub fn lines(&self, orientation: Orientation) -> usize {
        self.channels(orientation).len()
    }

    /// Default chain length for newly created channels.
    pub fn recyclings_per_channel(&self) -> usize {
        self.recyclings_per_channel
    }

    /// All channels on one side, ordered by line.
    pub fn channels(&self, orientation: Orientation) -> &[Channel] {
        match orientation {
            Orientation::Output => &self.outputs,
            Orientation::Input => &self.inputs,
        }
    }

    /// Looks up a channel by address.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels(id.orientation).get(id.line)
    }

    /// Output channels followed by input channels.
    pub fn iter_channels(&self) -> impl Iterator<Item = &Channel> {
        self.outputs.iter().chain(self.inputs.iter())
    }

    /// Every recycling of the audio object: output lines first, then input
    /// lines, each chain in order. This is the span of a whole-audio voice.
    pub fn span(&self) -> Vec<Arc<Recycling>> {
        self.iter_channels()
            .flat_map(|c| c.recyclings.iter().cloned())
            .collect()
    }

    /// Recyclings whose signals are summed into output `line`: the output
    /// channel's own chain plus every input line on the same audio channel.
    pub fn routed_recyclings(&self, line: usize) -> Vec<Arc<Recycling>> {
        let Some(output) = self.outputs.get(line) else {
            return Vec::new();
        };
        let mut routed = output.recyclings.clone();
        for input in self
            .inputs
            .iter()
            .filter(|c| c.audio_channel == output.audio_channel)
        {
            routed.extend(input.recyclings.iter().cloned());
        }
        routed
    }

    /// Grows or shrinks one channel's recycling chain to `count` elements.
    ///
    /// Existing recyclings are kept in place; growth appends fresh ones and
    /// shrinking drops from the end.
    pub fn resize_recyclings(
        &mut self,
        id: ChannelId,
        count: usize,
    ) -> Result<ChainChange, EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidTopology(format!(
                "{id} needs at least one recycling"
            )));
        }
        let channel = self
            .channel_mut(id)
            .ok_or(EngineError::ChannelNotFound(id))?;
        let old = channel.recyclings.clone();
        if count < old.len() {
            channel.recyclings.truncate(count);
        } else {
            let missing = count - old.len();
            channel
                .recyclings
                .extend((0..missing).map(|_| Recycling::new(id)));
        }
        relink(&channel.recyclings);
        tracing::debug!("topology_resize: {id} {} -> {count} recyclings", old.len());
        Ok(ChainChange {
            channel: id,
            old,
            new: channel.recyclings.clone(),
        })
    }

    /// Sets the number of pads on one side, adding or dropping whole pads
    /// at the end. Lines of surviving channels do not move.
    pub fn set_pads(&mut self, orientation: Orientation, pads: usize) -> Result<(), EngineError> {
        if pads == 0 && orientation == Orientation::Output {
            return Err(EngineError::EmptyOrientation(orientation));
        }
        let current = self.pads(orientation);
        if pads < current {
            let keep = pads * self.audio_channels;
            self.channels_vec(orientation).truncate(keep);
        } else {
            self.grow(orientation, pads - current);
        }
        tracing::debug!("topology_pads: {orientation} {current} -> {pads}");
        Ok(())
    }

    /// Changes the number of channels per pad.
    ///
    /// Channels whose (pad, audio channel) pair survives keep their
    /// recyclings but may move to a different line.
    pub fn set_audio_channels(&mut self, audio_channels: usize) -> Result<(), EngineError> {
        if audio_channels == 0 {
            return Err(EngineError::InvalidTopology(
                "audio_channels must be at least 1".into(),
            ));
        }
        let previous = self.audio_channels;
        for orientation in [Orientation::Output, Orientation::Input] {
            let pads = self.pads(orientation);
            let old = std::mem::take(self.channels_vec(orientation));
            let mut old: Vec<Option<Channel>> = old.into_iter().map(Some).collect();
            let mut relaid = Vec::with_capacity(pads * audio_channels);
            for pad in 0..pads {
                for audio_channel in 0..audio_channels {
                    let id = ChannelId {
                        orientation,
                        line: pad * audio_channels + audio_channel,
                    };
                    let reused = if audio_channel < previous {
                        old.get_mut(pad * previous + audio_channel)
                            .and_then(Option::take)
                    } else {
                        None
                    };
                    let channel = match reused {
                        Some(mut channel) => {
                            channel.relocate(id);
                            channel
                        }
                        None => Channel::new(id, pad, audio_channel, self.recyclings_per_channel),
                    };
                    relaid.push(channel);
                }
            }
            *self.channels_vec(orientation) = relaid;
        }
        self.audio_channels = audio_channels;
        tracing::debug!("topology_audio_channels: {previous} -> {audio_channels}");
        Ok(())
    }

    fn grow(&mut self, orientation: Orientation, pads: usize) {
        let audio_channels = self.audio_channels;
        let recyclings = self.recyclings_per_channel;
        let channels = self.channels_vec(orientation);
        let first_pad = channels.len() / audio_channels;
        for pad in first_pad..first_pad + pads {
            for audio_channel in 0..audio_channels {
                let id = ChannelId {
                    orientation,
                    line: pad * audio_channels + audio_channel,
                };
                channels.push(Channel::new(id, pad, audio_channel, recyclings));
            }
        }
    }

    fn channels_vec(&mut self, orientation: Orientation) -> &mut Vec<Channel> {
        match orientation {
            Orientation::Output => &mut self.outputs,
            Orientation::Input => &mut self.inputs,
        }
    }

    fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels_vec(id.orientation).get_mut(id.line)
    }
}
