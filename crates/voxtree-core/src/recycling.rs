//! Recyclings and the audio signals they carry.
//!
//! A [`Recycling`] is the smallest unit of audio storage addressed by the
//! graph. Each channel owns an ordered chain of them (linked through
//! [`next()`](Recycling::next) / [`prev()`](Recycling::prev)), and every
//! voice that produces audio into a recycling does so through an
//! [`AudioSignal`] tagged with the voice's [`RecallIdKey`].
//!
//! # Locking
//!
//! The signal list sits behind the recycling's own lock. Several recalls may
//! read a recycling in the same block (fan-in mixing), but a signal is only
//! ever written by the instance that owns its slot in the per-voice fan-out.
//! Writes from different voices into the same recycling serialize on that lock
//! and nowhere else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::recall_id::RecallIdKey;
use crate::topology::ChannelId;

static NEXT_RECYCLING: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a recycling.
///
/// Identifiers are process-wide and never reused, so they remain meaningful
/// after a channel has been resized and the recycling dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecyclingId(u64);

impl RecyclingId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RecyclingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Recycling({})", self.0)
    }
}

/// One voice's playback of a sample source inside a recycling.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    owner: RecallIdKey,
    source: Arc<[f32]>,
    position: usize,
    looping: bool,
    finished: bool,
    block: Vec<f32>,
}

impl AudioSignal {
    fn new(owner: RecallIdKey, source: Arc<[f32]>, looping: bool) -> Self {
        Self {
            owner,
            source,
            position: 0,
            looping,
            finished: false,
            block: Vec::new(),
        }
    }

    /// The voice that produced this signal.
    pub fn owner(&self) -> RecallIdKey {
        self.owner
    }

    /// Read position into the source, in samples.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether the signal wraps around at the end of its source.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Whether a non-looping signal has played past the end of its source.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The most recently produced block.
    pub fn block(&self) -> &[f32] {
        &self.block
    }

    fn restart(&mut self) {
        self.position = 0;
        self.finished = false;
    }

    /// Produces the next `block_size` samples into the block buffer.
    fn advance(&mut self, block_size: usize) {
        self.block.resize(block_size, 0.0);
        if self.finished || self.source.is_empty() {
            self.block.fill(0.0);
            self.finished = !self.looping || self.source.is_empty();
            return;
        }
        let len = self.source.len();
        for sample in &mut self.block {
            if self.position >= len {
                if self.looping {
                    self.position = 0;
                } else {
                    *sample = 0.0;
                    continue;
                }
            }
            *sample = self.source[self.position];
            self.position += 1;
        }
        if !self.looping && self.position >= len {
            self.finished = true;
        }
    }
}

#[derive(Default)]
struct Links {
    prev: Weak<Recycling>,
    next: Weak<Recycling>,
}

/// An ordered container of audio signals spawned from one channel.
pub struct Recycling {
    id: RecyclingId,
    channel: RwLock<ChannelId>,
    links: RwLock<Links>,
    source: RwLock<Option<Arc<[f32]>>>,
    signals: Mutex<Vec<AudioSignal>>,
}

impl Recycling {
    /// Creates an unlinked recycling belonging to `channel`.
    pub fn new(channel: ChannelId) -> Arc<Self> {
        Arc::new(Self {
            id: RecyclingId(NEXT_RECYCLING.fetch_add(1, Ordering::Relaxed)),
            channel: RwLock::new(channel),
            links: RwLock::new(Links::default()),
            source: RwLock::new(None),
            signals: Mutex::new(Vec::new()),
        })
    }

    /// Returns this recycling's identifier.
    #[inline]
    pub fn id(&self) -> RecyclingId {
        self.id
    }

    /// The channel this recycling was spawned from.
    pub fn channel(&self) -> ChannelId {
        *self.channel.read()
    }

    pub(crate) fn set_channel(&self, channel: ChannelId) {
        *self.channel.write() = channel;
    }

    /// The following recycling in the channel chain.
    pub fn next(&self) -> Option<Arc<Recycling>> {
        self.links.read().next.upgrade()
    }

    /// The preceding recycling in the channel chain.
    pub fn prev(&self) -> Option<Arc<Recycling>> {
        self.links.read().prev.upgrade()
    }

    /// Installs the sample source new signals are read from.
    pub fn set_source(&self, samples: impl Into<Arc<[f32]>>) {
        *self.source.write() = Some(samples.into());
    }

    /// Removes the sample source. Signals already playing keep their copy.
    pub fn clear_source(&self) {
        *self.source.write() = None;
    }

    /// The current sample source, if any.
    pub fn source(&self) -> Option<Arc<[f32]>> {
        self.source.read().clone()
    }

    /// Starts (or restarts) `owner`'s signal from the beginning of the source.
    ///
    /// Returns `false` when there is neither an existing signal to restart nor
    /// a source to start one from.
    pub fn trigger(&self, owner: RecallIdKey, looping: bool) -> bool {
        let mut signals = self.signals.lock();
        let mut restarted = false;
        for signal in signals.iter_mut().filter(|s| s.owner == owner) {
            signal.restart();
            signal.looping = looping;
            restarted = true;
        }
        if restarted {
            return true;
        }
        match self.source() {
            Some(source) => {
                signals.push(AudioSignal::new(owner, source, looping));
                true
            }
            None => false,
        }
    }

    /// Produces the next block of every signal owned by `owner`.
    ///
    /// Returns how many of the owner's signals are still playing afterwards.
    pub fn advance(&self, owner: RecallIdKey, block_size: usize) -> usize {
        let mut signals = self.signals.lock();
        let mut live = 0;
        for signal in signals.iter_mut().filter(|s| s.owner == owner) {
            signal.advance(block_size);
            if !signal.finished {
                live += 1;
            }
        }
        live
    }

    /// Multiplies the current block of `owner`'s signals by `gain`.
    pub fn scale(&self, owner: RecallIdKey, gain: f32) {
        let mut signals = self.signals.lock();
        for signal in signals.iter_mut().filter(|s| s.owner == owner) {
            for sample in &mut signal.block {
                *sample *= gain;
            }
        }
    }

    /// Removes every signal owned by `owner`, returning how many were removed.
    pub fn detach(&self, owner: RecallIdKey) -> usize {
        let mut signals = self.signals.lock();
        let before = signals.len();
        signals.retain(|s| s.owner != owner);
        before - signals.len()
    }

    /// Adds the current block of every signal into `out`.
    pub fn mix_into(&self, out: &mut [f32]) {
        let signals = self.signals.lock();
        for signal in signals.iter() {
            for (dst, src) in out.iter_mut().zip(signal.block.iter()) {
                *dst += *src;
            }
        }
    }

    /// Total number of signals, across all owners.
    pub fn signal_count(&self) -> usize {
        self.signals.lock().len()
    }

    /// Number of signals owned by `owner`.
    pub fn signals_of(&self, owner: RecallIdKey) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|s| s.owner == owner)
            .count()
    }

    /// Runs `f` over the signal list while holding the recycling lock.
    pub fn with_signals<R>(&self, f: impl FnOnce(&[AudioSignal]) -> R) -> R {
        f(&self.signals.lock())
    }
}

impl core::fmt::Debug for Recycling {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recycling")
            .field("id", &self.id)
            .field("channel", &self.channel())
            .finish_non_exhaustive()
    }
}

/// Re-links `chain` so that each element's next/prev point at its neighbours.
pub(crate) fn relink(chain: &[Arc<Recycling>]) {
    for (i, recycling) in chain.iter().enumerate() {
        let mut links = recycling.links.write();
        links.prev = if i > 0 {
            Arc::downgrade(&chain[i - 1])
        } else {
            Weak::new()
        };
        links.next = chain.get(i + 1).map(Arc::downgrade).unwrap_or_default();
    }
}

/// Returns `true` when `inner` appears in `outer` in the same relative order.
pub(crate) fn is_ordered_subset(inner: &[Arc<Recycling>], outer: &[Arc<Recycling>]) -> bool {
    let mut outer_iter = outer.iter();
    inner
        .iter()
        .all(|r| outer_iter.any(|o| o.id == r.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(n: u64) -> RecallIdKey {
        RecallIdKey::from_raw(n)
    }

    #[test]
    fn ids_are_unique() {
        let a = Recycling::new(ChannelId::output(0));
        let b = Recycling::new(ChannelId::output(0));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn relink_connects_neighbours() {
        let chain: Vec<_> = (0..3).map(|_| Recycling::new(ChannelId::input(1))).collect();
        relink(&chain);
        assert!(chain[0].prev().is_none());
        assert_eq!(chain[0].next().unwrap().id(), chain[1].id());
        assert_eq!(chain[2].prev().unwrap().id(), chain[1].id());
        assert!(chain[2].next().is_none());
    }

    #[test]
    fn trigger_without_source_fails() {
        let r = Recycling::new(ChannelId::output(0));
        assert!(!r.trigger(owner(1), false));
        assert_eq!(r.signal_count(), 0);
    }

    #[test]
    fn advance_plays_source_to_the_end() {
        let r = Recycling::new(ChannelId::output(0));
        r.set_source(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(r.trigger(owner(7), false));

        assert_eq!(r.advance(owner(7), 4), 1);
        r.with_signals(|s| assert_eq!(s[0].block(), &[1.0, 2.0, 3.0, 4.0]));

        assert_eq!(r.advance(owner(7), 4), 0);
        r.with_signals(|s| {
            assert_eq!(s[0].block(), &[5.0, 0.0, 0.0, 0.0]);
            assert!(s[0].is_finished());
        });
    }

    #[test]
    fn looping_signal_wraps() {
        let r = Recycling::new(ChannelId::output(0));
        r.set_source(vec![1.0, 2.0]);
        r.trigger(owner(1), true);
        assert_eq!(r.advance(owner(1), 3), 1);
        r.with_signals(|s| assert_eq!(s[0].block(), &[1.0, 2.0, 1.0]));
    }

    #[test]
    fn retrigger_restarts_existing_signal() {
        let r = Recycling::new(ChannelId::output(0));
        r.set_source(vec![1.0, 2.0]);
        r.trigger(owner(1), false);
        r.advance(owner(1), 2);
        r.trigger(owner(1), false);
        assert_eq!(r.signals_of(owner(1)), 1);
        r.with_signals(|s| assert_eq!(s[0].position(), 0));
    }

    #[test]
    fn owners_are_isolated() {
        let r = Recycling::new(ChannelId::output(0));
        r.set_source(vec![0.5; 8]);
        r.trigger(owner(1), false);
        r.trigger(owner(2), false);
        r.advance(owner(1), 4);
        r.advance(owner(2), 4);
        r.scale(owner(2), 0.0);

        let mut out = vec![0.0; 4];
        r.mix_into(&mut out);
        assert_eq!(out, vec![0.5; 4]);

        assert_eq!(r.detach(owner(1)), 1);
        assert_eq!(r.signal_count(), 1);
        assert_eq!(r.signals_of(owner(2)), 1);
    }

    #[test]
    fn ordered_subset() {
        let chain: Vec<_> = (0..4).map(|_| Recycling::new(ChannelId::output(0))).collect();
        assert!(is_ordered_subset(&chain[1..3], &chain));
        assert!(is_ordered_subset(&[chain[0].clone(), chain[3].clone()], &chain));
        assert!(!is_ordered_subset(&[chain[2].clone(), chain[1].clone()], &chain));
        let stranger = Recycling::new(ChannelId::output(0));
        assert!(!is_ordered_subset(&[stranger], &chain));
    }
}
