//! Built-in recall kinds.
//!
//! A template's behavior is picked at construction time from [`RecallKind`].
//! Each variant wraps a concrete [`RecallHandler`]; `Custom` accepts any boxed
//! handler for kinds defined outside this crate.
//!
//! | Kind | Level | Phase | Role |
//! |------|-------|-------|------|
//! | [`DelayCounter`] | audio | `run_pre` | fires every `delay` blocks |
//! | [`BeatCounter`] | audio | `run_pre` | counts fired beats up to `length` |
//! | [`Pattern`] | channel | `run_inter` | triggers its streams on set steps |
//! | [`Play`] | channel | none | parent of one stream per recycling |
//! | [`Stream`] | recycling | `run_inter` | advances the voice's signal |
//! | [`Volume`] | channel / recycling | `run_post` | scales the voice's signals |

mod counter;
mod pattern;
mod stream;
mod volume;

pub use counter::{BeatCounter, DelayCounter};
pub use pattern::Pattern;
pub use stream::{Play, Stream};
pub use volume::Volume;

use crate::recall::RecallHandler;

/// Kind names of the built-in variants.
pub const KIND_NAMES: &[&str] = &[
    DelayCounter::NAME,
    BeatCounter::NAME,
    Pattern::NAME,
    Play::NAME,
    Stream::NAME,
    Volume::NAME,
];

/// The behavior of a recall.
pub enum RecallKind {
    /// Block counter that fires every `delay` blocks.
    DelayCounter(DelayCounter),
    /// Beat counter driven by a delay counter.
    BeatCounter(BeatCounter),
    /// Step pattern driving stream children.
    Pattern(Pattern),
    /// One-shot playback of each recycling.
    Play(Play),
    /// Per-recycling signal producer.
    Stream(Stream),
    /// Gain applied to the voice's signals.
    Volume(Volume),
    /// User-supplied handler.
    Custom(Box<dyn RecallHandler>),
}

impl RecallKind {
    /// The handler behind this kind.
    pub fn handler(&self) -> &dyn RecallHandler {
        match self {
            Self::DelayCounter(h) => h,
            Self::BeatCounter(h) => h,
            Self::Pattern(h) => h,
            Self::Play(h) => h,
            Self::Stream(h) => h,
            Self::Volume(h) => h,
            Self::Custom(h) => h.as_ref(),
        }
    }

    /// Mutable access to the handler.
    pub fn handler_mut(&mut self) -> &mut dyn RecallHandler {
        match self {
            Self::DelayCounter(h) => h,
            Self::BeatCounter(h) => h,
            Self::Pattern(h) => h,
            Self::Play(h) => h,
            Self::Stream(h) => h,
            Self::Volume(h) => h,
            Self::Custom(h) => h.as_mut(),
        }
    }

    /// Kind name of the handler.
    pub fn name(&self) -> &'static str {
        self.handler().kind_name()
    }

    /// A fresh copy for a new instance.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::DelayCounter(h) => Self::DelayCounter(h.clone()),
            Self::BeatCounter(h) => Self::BeatCounter(h.clone()),
            Self::Pattern(h) => Self::Pattern(h.clone()),
            Self::Play(h) => Self::Play(h.clone()),
            Self::Stream(h) => Self::Stream(h.clone()),
            Self::Volume(h) => Self::Volume(h.clone()),
            Self::Custom(h) => Self::Custom(h.duplicate()),
        }
    }

    /// The delay counter, if this is one.
    pub fn as_delay_counter(&self) -> Option<&DelayCounter> {
        match self {
            Self::DelayCounter(h) => Some(h),
            _ => None,
        }
    }

    /// The beat counter, if this is one.
    pub fn as_beat_counter(&self) -> Option<&BeatCounter> {
        match self {
            Self::BeatCounter(h) => Some(h),
            _ => None,
        }
    }

    /// The stream, if this is one.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Self::Stream(h) => Some(h),
            _ => None,
        }
    }
}

impl core::fmt::Debug for RecallKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RecallKind").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_handlers() {
        let kinds = [
            RecallKind::DelayCounter(DelayCounter::new()),
            RecallKind::BeatCounter(BeatCounter::new()),
            RecallKind::Pattern(Pattern::parse("x...")),
            RecallKind::Play(Play),
            RecallKind::Stream(Stream::new(true)),
            RecallKind::Volume(Volume::new()),
        ];
        let names: Vec<_> = kinds.iter().map(RecallKind::name).collect();
        assert_eq!(names, KIND_NAMES);
    }

    #[test]
    fn duplicate_keeps_variant() {
        let kind = RecallKind::Stream(Stream::new(true));
        let copy = kind.duplicate();
        assert!(copy.as_stream().unwrap().is_looping());
        assert!(copy.as_delay_counter().is_none());
    }
}
