//! Recall IDs and sound scopes.
//!
//! A [`RecallId`] binds one [`RecyclingContext`] to one [`SoundScope`] for the
//! lifetime of a voice. Every recall instance duplicated for that voice carries
//! the same id, which is what dependency resolution matches on.
//!
//! The id and its context are created together ([`RecallId::new`]). The id
//! holds the context strongly, and the context points back with a weak
//! reference. When the context's span is replaced structurally, the id is
//! re-pointed at the replacement so later lookups see the new span.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::context::RecyclingContext;
use crate::recycling::Recycling;

static NEXT_RECALL_ID: AtomicU64 = AtomicU64::new(1);

/// Bitset of sound scopes a voice or template belongs to.
///
/// # Example
///
/// ```rust
/// use voxtree_core::SoundScope;
///
/// let scope = SoundScope::PLAYBACK.union(SoundScope::SEQUENCER);
/// assert!(scope.intersects(SoundScope::SEQUENCER));
/// assert!(!scope.intersects(SoundScope::NOTATION));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoundScope(u8);

impl SoundScope {
    /// No scope.
    pub const NONE: Self = Self(0);
    /// Live playback (e.g. a played note).
    pub const PLAYBACK: Self = Self(1 << 0);
    /// Step sequencer.
    pub const SEQUENCER: Self = Self(1 << 1);
    /// Notation (piano roll) playback.
    pub const NOTATION: Self = Self(1 << 2);
    /// Arranged wave/audio regions.
    pub const WAVE: Self = Self(1 << 3);
    /// MIDI input.
    pub const MIDI: Self = Self(1 << 4);
    /// Every scope.
    pub const ALL: Self = Self(0b1_1111);

    const NAMES: [(&'static str, Self); 5] = [
        ("playback", Self::PLAYBACK),
        ("sequencer", Self::SEQUENCER),
        ("notation", Self::NOTATION),
        ("wave", Self::WAVE),
        ("midi", Self::MIDI),
    ];

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit is shared.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of two scopes.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` when no scope bit is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parses a single lowercase scope name (`"playback"`, `"sequencer"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| *s)
    }

    /// Names of the scopes set in `self`.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, s)| self.contains(*s))
            .map(|(n, _)| *n)
            .collect()
    }
}

impl Default for SoundScope {
    fn default() -> Self {
        Self::PLAYBACK
    }
}

impl core::fmt::Display for SoundScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join("|"))
    }
}

/// Numeric key of a [`RecallId`], used to tag audio signals and to match
/// instances during dependency resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecallIdKey(u64);

impl RecallIdKey {
    /// Returns the raw numeric key.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl core::fmt::Display for RecallIdKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RecallId({})", self.0)
    }
}

/// Binds one recycling context to one sound scope.
pub struct RecallId {
    key: RecallIdKey,
    scope: SoundScope,
    context: ArcSwap<RecyclingContext>,
}

impl RecallId {
    /// Creates a recall id together with its recycling context over `span`.
    ///
    /// The context starts unparented; attach it with
    /// [`RecyclingContext::add_child`].
    pub fn new(scope: SoundScope, span: Vec<Arc<Recycling>>) -> Arc<Self> {
        let key = RecallIdKey(NEXT_RECALL_ID.fetch_add(1, Ordering::Relaxed));
        Arc::new_cyclic(|weak: &Weak<RecallId>| Self {
            key,
            scope,
            context: ArcSwap::new(RecyclingContext::new(span, weak.clone())),
        })
    }

    /// This id's key.
    #[inline]
    pub fn key(&self) -> RecallIdKey {
        self.key
    }

    /// The sound scope this id was allocated for.
    #[inline]
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// The current recycling context.
    ///
    /// After a structural span replacement this returns the replacement;
    /// callers holding the previous context keep a valid, unchanged object.
    pub fn context(&self) -> Arc<RecyclingContext> {
        self.context.load_full()
    }

    /// The recall id of the parent context, one level up.
    pub fn parent(&self) -> Option<Arc<RecallId>> {
        self.context().parent()?.recall_id()
    }

    pub(crate) fn set_context(&self, context: Arc<RecyclingContext>) {
        self.context.store(context);
    }
}

impl core::fmt::Debug for RecallId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallId")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("span", &self.context().len())
            .finish()
    }
}
