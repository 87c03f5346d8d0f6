//! Behavioral flags and the instance lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};

/// Behavioral flags carried by templates and copied onto their instances.
///
/// Sound-scope membership lives in [`SoundScope`](crate::SoundScope), not here.
///
/// # Example
///
/// ```rust
/// use voxtree_core::RecallFlags;
///
/// let flags = RecallFlags::PERSISTENT.union(RecallFlags::RUN_LAST);
/// assert!(flags.contains(RecallFlags::PERSISTENT));
/// assert!(!flags.contains(RecallFlags::HIDDEN));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecallFlags(u8);

impl RecallFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Static description, never scheduled.
    pub const TEMPLATE: Self = Self(1 << 0);
    /// Instance does not complete on its own; only cancel ends it.
    pub const PERSISTENT: Self = Self(1 << 1);
    /// Scheduled before its siblings in every phase.
    pub const RUN_FIRST: Self = Self(1 << 2);
    /// Scheduled after its siblings in every phase.
    pub const RUN_LAST: Self = Self(1 << 3);
    /// Excluded from port lookup.
    pub const HIDDEN: Self = Self(1 << 4);

    const NAMES: [(&'static str, Self); 4] = [
        ("persistent", Self::PERSISTENT),
        ("run-first", Self::RUN_FIRST),
        ("run-last", Self::RUN_LAST),
        ("hidden", Self::HIDDEN),
    ];

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with the bits of `other` cleared.
    #[inline]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Parses a configurable flag name (`"persistent"`, `"run-first"`,
    /// `"run-last"`, `"hidden"`). `TEMPLATE` is not nameable.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// Names of the configurable flags set in `self`.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(n, _)| *n)
            .collect()
    }

    /// Scheduling rank among siblings: run-first, normal, run-last.
    pub(crate) const fn rank(self) -> u8 {
        if self.contains(Self::RUN_FIRST) {
            0
        } else if self.contains(Self::RUN_LAST) {
            2
        } else {
            1
        }
    }
}

/// Lifecycle state of a recall.
///
/// States only move forward. `Pending` marks an instance that has been
/// duplicated (and possibly admitted) but has not yet run its init phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    /// Inert description; never scheduled.
    Template = 0,
    /// Duplicated instance awaiting its init phases.
    Pending = 1,
    /// Init phases have run.
    Initialized = 2,
    /// At least one full run stage has completed.
    Running = 3,
    /// Finished or cancelled; pruned at the end of the current tick.
    Done = 4,
    /// Detached and released by the scheduler.
    Removed = 5,
}

impl Lifecycle {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Template,
            1 => Self::Pending,
            2 => Self::Initialized,
            3 => Self::Running,
            4 => Self::Done,
            _ => Self::Removed,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Pending => "pending",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Done => "done",
            Self::Removed => "removed",
        }
    }
}

impl core::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only atomic lifecycle cell.
pub(crate) struct AtomicLifecycle(AtomicU8);

impl AtomicLifecycle {
    pub(crate) const fn new(state: Lifecycle) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if that is later than the current state.
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn advance(&self, next: Lifecycle) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok()
    }
}
