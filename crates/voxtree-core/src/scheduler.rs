//! Stage scheduler.
//!
//! One [`Scheduler::tick`] advances every active voice by one audio block:
//!
//! 1. **Admit** voices queued since the last tick (command queue drained with
//!    `try_lock`; a busy queue is drained next tick).
//! 2. **Init stage**: `run_init_pre → run_init_inter → run_init_post` for every
//!    instance still pending. Afterwards it is `Initialized`.
//! 3. **Run stage**: `automate → run_pre → run_inter → run_post` for every
//!    initialized instance. Afterwards it is `Running`.
//! 4. **Collect**: the caller reads the blocks produced this tick.
//! 5. **Prune** at the safe point after the last phase: `Done` subtrees run
//!    their remove hook, become `Removed`, and are detached. Fanned-out
//!    parents left without children follow them. A voice without roots is
//!    finished and its context leaves the tree.
//!
//! Phases are executed phase-major: every voice finishes phase *n* before
//! any voice starts phase *n + 1*. Within a voice the instance tree is visited
//! top-down, parent before children. Voices are independent and may run on
//! parallel workers (`rayon`), with the end of each phase as the barrier.
//!
//! A cancel request is observed on the next visit: the cancel hook runs and
//! the subtree is marked `Done`. A hook that returns an error is logged and
//! ends its own subtree; siblings continue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::flags::Lifecycle;
use crate::recall::{Phase, Recall, StageContext, run_phase};
use crate::recall_id::RecallId;
use crate::voice::Voice;

/// Structural commands applied at the start of a tick.
#[derive(Debug)]
pub(crate) enum SchedulerCommand {
    /// Add a fully duplicated and resolved voice to the active list.
    Admit(Arc<Voice>),
}

/// How the phases of one tick are executed.
#[derive(Clone, Copy)]
pub(crate) enum Execution<'a> {
    /// Voices one after another on the calling thread.
    Sequential,
    /// Voices in parallel, on the given pool or rayon's global pool.
    Parallel(Option<&'a ThreadPool>),
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number (0 for the first tick).
    pub tick: u64,
    /// Voices admitted at the start of the tick.
    pub admitted: usize,
    /// Voices still active after pruning.
    pub active_voices: usize,
    /// Instances removed during pruning.
    pub removed: usize,
    /// Voices that finished during pruning.
    pub finished_voices: usize,
    /// Phase hooks that returned an error.
    pub failures: usize,
}

/// Drives every active voice through the phases once per tick.
pub struct Scheduler {
    voices: ArcSwap<Vec<Arc<Voice>>>,
    commands: Mutex<VecDeque<SchedulerCommand>>,
    tick: AtomicU64,
    tick_guard: Mutex<()>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self {
            voices: ArcSwap::from_pointee(Vec::new()),
            commands: Mutex::new(VecDeque::new()),
            tick: AtomicU64::new(0),
            tick_guard: Mutex::new(()),
        }
    }

    /// Snapshot of the active voices.
    pub fn voices(&self) -> Arc<Vec<Arc<Voice>>> {
        self.voices.load_full()
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.commands.lock().len()
    }

    pub(crate) fn push(&self, command: SchedulerCommand) {
        self.commands.lock().push_back(command);
    }

    /// Runs one tick. `before_prune` is called after the last phase, while
    /// the blocks produced this tick are still attached to their recyclings.
    pub(crate) fn tick(
        &self,
        block_size: usize,
        execution: Execution<'_>,
        before_prune: impl FnOnce(),
    ) -> TickReport {
        let _guard = self.tick_guard.lock();
        let tick = self.tick.fetch_add(1, Ordering::AcqRel);
        let admitted = self.drain_commands();
        let voices = self.voices.load_full();

        let failures = AtomicUsize::new(0);
        let pass = Pass {
            tick,
            block_size,
            failures: &failures,
        };
        for phase in Phase::INIT.into_iter().chain(Phase::RUN) {
            match execution {
                Execution::Sequential => voices.iter().for_each(|v| pass.run_voice(v, phase)),
                Execution::Parallel(Some(pool)) => {
                    pool.install(|| voices.par_iter().for_each(|v| pass.run_voice(v, phase)));
                }
                Execution::Parallel(None) => {
                    voices.par_iter().for_each(|v| pass.run_voice(v, phase));
                }
            }
        }

        before_prune();
        let (removed, finished_voices) = pass.prune(&voices);
        let active: Vec<_> = voices.iter().filter(|v| !v.is_finished()).cloned().collect();
        let active_voices = active.len();
        if active_voices != voices.len() {
            self.voices.store(Arc::new(active));
        }

        TickReport {
            tick,
            admitted,
            active_voices,
            removed,
            finished_voices,
            failures: failures.load(Ordering::Relaxed),
        }
    }

    fn drain_commands(&self) -> usize {
        let Some(commands) = self
            .commands
            .try_lock()
            .map(|mut q| q.drain(..).collect::<Vec<_>>())
        else {
            return 0;
        };
        if commands.is_empty() {
            return 0;
        }
        let mut voices = Vec::clone(&self.voices.load());
        let mut admitted = 0;
        for command in commands {
            match command {
                SchedulerCommand::Admit(voice) => {
                    tracing::debug!("scheduler_admit: {}", voice.key());
                    voices.push(voice);
                    admitted += 1;
                }
            }
        }
        self.voices.store(Arc::new(voices));
        admitted
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("voices", &self.voices.load().len())
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

struct Pass<'a> {
    tick: u64,
    block_size: usize,
    failures: &'a AtomicUsize,
}

impl Pass<'_> {
    fn run_voice(&self, voice: &Voice, phase: Phase) {
        for root in voice.roots().iter() {
            self.visit(root, phase);
        }
    }

    fn visit(&self, recall: &Arc<Recall>, phase: Phase) {
        let state = recall.state();
        if state >= Lifecycle::Done {
            return;
        }
        let Some(recall_id) = recall.recall_id() else {
            return;
        };
        if recall.is_cancel_requested() {
            self.cancel(recall, recall_id);
            return;
        }

        if phase.is_init() {
            if state == Lifecycle::Pending && recall.init_progress() == phase.init_index() {
                if !self.run_hook(recall, recall_id, phase) {
                    return;
                }
                recall.set_init_progress(phase.init_index() + 1);
                if phase == Phase::InitPost {
                    recall.advance(Lifecycle::Initialized);
                }
            }
        } else {
            if state == Lifecycle::Pending {
                return;
            }
            if phase == Phase::Automate {
                for port in recall.ports() {
                    port.automate(self.tick);
                }
            }
            if !self.run_hook(recall, recall_id, phase) {
                return;
            }
            if phase == Phase::Post {
                recall.advance(Lifecycle::Running);
            }
        }

        for child in recall.children().iter() {
            self.visit(child, phase);
        }
    }

    /// Runs one hook. Returns `false` if the instance ended.
    fn run_hook(&self, recall: &Arc<Recall>, recall_id: &Arc<RecallId>, phase: Phase) -> bool {
        if recall.is_inert() {
            return true;
        }
        let (result, done) = {
            let mut kind = recall.lock_kind();
            let mut cx = StageContext::new(recall, recall_id, self.tick, self.block_size);
            let result = run_phase(kind.handler_mut(), phase, &mut cx);
            (result, cx.is_done())
        };
        match result {
            Ok(()) if done => {
                tracing::debug!("scheduler_done: {} in {phase}", recall.name());
                recall.mark_subtree_done();
                false
            }
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    recall = recall.name(),
                    phase = %phase,
                    recall_id = %recall_id.key(),
                    error = %err,
                    "phase hook failed; removing instance"
                );
                self.failures.fetch_add(1, Ordering::Relaxed);
                recall.mark_subtree_done();
                false
            }
        }
    }

    fn cancel(&self, recall: &Arc<Recall>, recall_id: &Arc<RecallId>) {
        let result = {
            let mut kind = recall.lock_kind();
            let mut cx = StageContext::new(recall, recall_id, self.tick, self.block_size);
            kind.handler_mut().cancel(&mut cx)
        };
        if let Err(err) = result {
            tracing::warn!(recall = recall.name(), error = %err, "cancel hook failed");
        }
        tracing::debug!("scheduler_cancel: {} for {}", recall.name(), recall_id.key());
        recall.mark_subtree_done();
    }

    /// Prunes every voice. Returns (removed instances, finished voices).
    fn prune(&self, voices: &[Arc<Voice>]) -> (usize, usize) {
        let mut removed = 0;
        let mut finished = 0;
        for voice in voices {
            let roots = voice.roots();
            let dropped: Vec<_> = roots
                .iter()
                .filter(|root| self.prune_node(root, &mut removed))
                .cloned()
                .collect();
            let remaining = if dropped.is_empty() {
                roots.len()
            } else {
                voice.remove_roots(&dropped)
            };
            if remaining == 0 && voice.finish() {
                let context = voice.context();
                if let Some(parent) = context.parent() {
                    parent.remove_child(&context);
                }
                tracing::debug!("scheduler_finish: {}", voice.key());
                finished += 1;
            }
        }
        (removed, finished)
    }

    /// Returns `true` if `node` was removed and must be detached by the caller.
    fn prune_node(&self, node: &Arc<Recall>, removed: &mut usize) -> bool {
        if node.state() >= Lifecycle::Done {
            self.remove_subtree(node, removed);
            return true;
        }
        let children = node.children();
        let mut any_removed = false;
        for child in children.iter() {
            if self.prune_node(child, removed) {
                node.remove_child(child);
                any_removed = true;
            }
        }
        if any_removed
            && node.is_fanned_out()
            && !node.is_persistent()
            && node.children().is_empty()
        {
            node.mark_subtree_done();
            self.remove_subtree(node, removed);
            return true;
        }
        false
    }

    fn remove_subtree(&self, node: &Arc<Recall>, removed: &mut usize) {
        for child in node.children().iter() {
            self.remove_subtree(child, removed);
        }
        if let Some(recall_id) = node.recall_id() {
            let result = {
                let mut kind = node.lock_kind();
                let mut cx = StageContext::new(node, recall_id, self.tick, self.block_size);
                kind.handler_mut().remove(&mut cx)
            };
            if let Err(err) = result {
                tracing::warn!(recall = node.name(), error = %err, "remove hook failed");
            }
        }
        node.advance(Lifecycle::Removed);
        if let Some(container) = node.container() {
            container.forget(node);
        }
        *removed += 1;
        tracing::debug!("scheduler_remove: {} ({})", node.name(), node.serial());
    }
}
