//! Voices.
//!
//! A [`Voice`] is one independent instantiation of the processing graph: one
//! [`RecallId`] (and therefore one recycling context) plus the roots of the
//! instance trees duplicated for it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::context::RecyclingContext;
use crate::recall::{Recall, RecallKey};
use crate::recall_id::{RecallId, RecallIdKey, SoundScope};
use crate::resolve::ResolutionReport;
use crate::topology::ChannelId;

/// Where a voice takes its span from when the topology changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceBinding {
    /// Every recycling of the audio object.
    Audio,
    /// One channel's chain.
    Channel(ChannelId),
    /// The span of the voice it is nested under.
    Inherit,
}

/// Handle returned by [`Engine::start_voice`](crate::Engine::start_voice).
pub type VoiceHandle = Arc<Voice>;

/// One running voice.
pub struct Voice {
    recall_id: Arc<RecallId>,
    binding: VoiceBinding,
    roots: ArcSwap<Vec<Arc<Recall>>>,
    roots_lock: Mutex<()>,
    finished: AtomicBool,
    resolution: Mutex<ResolutionReport>,
    /// Templates ever duplicated for this voice, removed instances included.
    duplicated: Mutex<HashSet<RecallKey>>,
}

impl Voice {
    pub(crate) fn new(recall_id: Arc<RecallId>, binding: VoiceBinding) -> Arc<Self> {
        Arc::new(Self {
            recall_id,
            binding,
            roots: ArcSwap::from_pointee(Vec::new()),
            roots_lock: Mutex::new(()),
            finished: AtomicBool::new(false),
            resolution: Mutex::new(ResolutionReport::default()),
            duplicated: Mutex::new(HashSet::new()),
        })
    }

    /// The voice's recall id.
    pub fn recall_id(&self) -> &Arc<RecallId> {
        &self.recall_id
    }

    /// Shorthand for the recall id's key.
    pub fn key(&self) -> RecallIdKey {
        self.recall_id.key()
    }

    /// Sound scope the voice was started in.
    pub fn scope(&self) -> SoundScope {
        self.recall_id.scope()
    }

    /// How the span is derived.
    pub fn binding(&self) -> VoiceBinding {
        self.binding
    }

    /// Current recycling context.
    pub fn context(&self) -> Arc<RecyclingContext> {
        self.recall_id.context()
    }

    /// Snapshot of the root instances, in scheduling order.
    pub fn roots(&self) -> Arc<Vec<Arc<Recall>>> {
        self.roots.load_full()
    }

    /// Returns `true` once every root has been removed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Accumulated dependency resolution results.
    pub fn resolution(&self) -> ResolutionReport {
        self.resolution.lock().clone()
    }

    /// Requests cancellation of every root instance.
    pub fn cancel(&self, propagate: bool) {
        for root in self.roots.load().iter() {
            root.cancel(propagate);
        }
    }

    /// Every instance of the voice, depth-first, roots first.
    pub fn instances(&self) -> Vec<Arc<Recall>> {
        let mut out = Vec::new();
        for root in self.roots.load().iter() {
            collect(root, &mut out);
        }
        out
    }

    /// The first instance with the given template name.
    pub fn find(&self, name: &str) -> Option<Arc<Recall>> {
        self.instances().into_iter().find(|r| r.name() == name)
    }

    /// Returns `true` if this voice's context sits below `other`'s.
    pub fn is_nested_in(&self, other: &Voice) -> bool {
        let target = other.context();
        let mut current = self.context().parent();
        while let Some(ctx) = current {
            if Arc::ptr_eq(&ctx, &target) {
                return true;
            }
            current = ctx.parent();
        }
        false
    }

    pub(crate) fn add_roots(&self, roots: impl IntoIterator<Item = Arc<Recall>>) {
        let _guard = self.roots_lock.lock();
        let mut all = Vec::clone(&self.roots.load());
        all.extend(roots);
        all.sort_by_key(|r| r.rank());
        self.roots.store(Arc::new(all));
    }

    /// Drops `removed` from the roots. Returns how many roots remain.
    pub(crate) fn remove_roots(&self, removed: &[Arc<Recall>]) -> usize {
        let _guard = self.roots_lock.lock();
        let mut roots = Vec::clone(&self.roots.load());
        roots.retain(|r| !removed.iter().any(|x| Arc::ptr_eq(r, x)));
        let remaining = roots.len();
        self.roots.store(Arc::new(roots));
        remaining
    }

    /// Returns `true` if `template` was duplicated for this voice at some
    /// point, even if that instance has since been removed.
    pub fn was_duplicated(&self, template: RecallKey) -> bool {
        self.duplicated.lock().contains(&template)
    }

    /// Records `template` as duplicated. Returns `false` if it already was.
    pub(crate) fn mark_duplicated(&self, template: RecallKey) -> bool {
        self.duplicated.lock().insert(template)
    }

    pub(crate) fn merge_resolution(&self, report: ResolutionReport) {
        self.resolution.lock().merge(report);
    }

    /// Marks the voice finished. Returns `false` if it already was.
    pub(crate) fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }
}

impl core::fmt::Debug for Voice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Voice")
            .field("recall_id", &self.key())
            .field("binding", &self.binding)
            .field("roots", &self.roots.load().len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn collect(recall: &Arc<Recall>, out: &mut Vec<Arc<Recall>>) {
    out.push(Arc::clone(recall));
    for child in recall.children().iter() {
        collect(child, out);
    }
}
