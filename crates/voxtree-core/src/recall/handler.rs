//! Phase hooks.
//!
//! The [`RecallHandler`] trait is what a recall kind implements to take part in
//! the staged execution protocol. Every hook has a no-op default, so a kind
//! overrides only the phases it cares about.
//!
//! ## Phases
//!
//! | Stage | Phases | When |
//! |-------|--------|------|
//! | init  | `init_pre`, `init_inter`, `init_post` | once, the first tick an instance takes part in |
//! | run   | `automate`, `run_pre`, `run_inter`, `run_post` | every tick |
//!
//! Within a phase the scheduler visits a voice's instance tree top-down: a
//! parent's hook returns (and its lock is released) before any of its
//! children's hooks for the same phase begin. A hook that returns `Err` ends
//! its own instance and subtree; siblings keep running.
//!
//! Hooks run on the tick thread (or a worker of the tick pool) and must not
//! block.

use std::sync::Arc;

use crate::error::RecallError;
use crate::flags::RecallFlags;
use crate::port::{Port, PortSpec};
use crate::recall::Recall;
use crate::recall_id::{RecallId, RecallIdKey};
use crate::recycling::Recycling;

/// One step of the staged execution protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// First init phase.
    InitPre,
    /// Second init phase.
    InitInter,
    /// Last init phase; the instance is initialized afterwards.
    InitPost,
    /// Scheduled port values are applied.
    Automate,
    /// First run phase.
    Pre,
    /// Main run phase.
    Inter,
    /// Last run phase.
    Post,
}

impl Phase {
    /// Init phases in execution order.
    pub const INIT: [Phase; 3] = [Phase::InitPre, Phase::InitInter, Phase::InitPost];
    /// Run phases in execution order.
    pub const RUN: [Phase; 4] = [Phase::Automate, Phase::Pre, Phase::Inter, Phase::Post];

    /// Returns `true` for the one-shot init phases.
    pub const fn is_init(self) -> bool {
        matches!(self, Phase::InitPre | Phase::InitInter | Phase::InitPost)
    }

    /// Position within the init stage.
    pub(crate) const fn init_index(self) -> u8 {
        match self {
            Phase::InitPre => 0,
            Phase::InitInter => 1,
            _ => 2,
        }
    }

    /// Hook name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::InitPre => "run_init_pre",
            Phase::InitInter => "run_init_inter",
            Phase::InitPost => "run_init_post",
            Phase::Automate => "automate",
            Phase::Pre => "run_pre",
            Phase::Inter => "run_inter",
            Phase::Post => "run_post",
        }
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook sees of the instance it runs for.
pub struct StageContext<'a> {
    recall: &'a Arc<Recall>,
    recall_id: &'a Arc<RecallId>,
    tick: u64,
    block_size: usize,
    done: bool,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        recall: &'a Arc<Recall>,
        recall_id: &'a Arc<RecallId>,
        tick: u64,
        block_size: usize,
    ) -> Self {
        Self {
            recall,
            recall_id,
            tick,
            block_size,
            done: false,
        }
    }

    /// The instance being run.
    pub fn recall(&self) -> &Arc<Recall> {
        self.recall
    }

    /// Current tick number.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Frames per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The voice's recall id.
    pub fn recall_id(&self) -> &Arc<RecallId> {
        self.recall_id
    }

    /// Key used to tag the audio signals this voice owns.
    pub fn owner(&self) -> RecallIdKey {
        self.recall_id.key()
    }

    /// The recycling a per-recycling instance is bound to.
    pub fn recycling(&self) -> Option<&Arc<Recycling>> {
        self.recall.recycling()
    }

    /// Port by control name.
    pub fn port(&self, name: &str) -> Option<&Arc<Port>> {
        self.recall.port(name)
    }

    /// Current value of the named port, or `default` if there is none.
    pub fn port_value(&self, name: &str, default: f32) -> f32 {
        self.port(name).map_or(default, |p| p.get())
    }

    /// The resolved instance for the `index`-th declared dependency.
    pub fn dependency(&self, index: usize) -> Option<Arc<Recall>> {
        self.recall.dependency(index)
    }

    /// The first resolved dependency of the given kind.
    pub fn dependency_of_kind(&self, kind_name: &str) -> Option<Arc<Recall>> {
        self.recall
            .resolved_dependencies()
            .into_iter()
            .flatten()
            .find(|d| d.kind_name() == kind_name)
    }

    /// Snapshot of the instance's children.
    pub fn children(&self) -> Arc<Vec<Arc<Recall>>> {
        self.recall.children()
    }

    /// Whether the instance carries [`RecallFlags::PERSISTENT`].
    pub fn is_persistent(&self) -> bool {
        self.recall.flags().contains(RecallFlags::PERSISTENT)
    }

    /// Marks the instance done. It is pruned at the end of the tick.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

/// Behavior of one recall kind.
///
/// # Example
///
/// ```rust
/// use voxtree_core::{RecallError, RecallHandler, StageContext};
///
/// #[derive(Clone, Default)]
/// struct TickCounter {
///     ticks: u64,
/// }
///
/// impl RecallHandler for TickCounter {
///     fn kind_name(&self) -> &'static str {
///         "tick-counter"
///     }
///
///     fn duplicate(&self) -> Box<dyn RecallHandler> {
///         Box::new(Self::default())
///     }
///
///     fn run_pre(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
///         self.ticks += 1;
///         if self.ticks == 8 {
///             cx.set_done();
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait RecallHandler: Send {
    /// Stable kind name (`"stream"`, `"volume"`, ...).
    fn kind_name(&self) -> &'static str;

    /// A fresh copy for a new instance.
    ///
    /// Called once per duplication. The copy starts from the template's
    /// constructor-time state, not from any live instance.
    fn duplicate(&self) -> Box<dyn RecallHandler>;

    /// Ports the template creates for this kind.
    fn port_specs(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Flags added to every template of this kind.
    fn default_flags(&self) -> RecallFlags {
        RecallFlags::NONE
    }

    /// First init hook.
    fn init_pre(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Second init hook.
    fn init_inter(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Last init hook.
    fn init_post(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Runs after due port automation has been applied.
    fn automate(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// First run hook.
    fn run_pre(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Main run hook.
    fn run_inter(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Last run hook.
    fn run_post(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Called once when a cancel request is observed.
    fn cancel(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }

    /// Called once when the instance is pruned.
    fn remove(&mut self, _cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        Ok(())
    }
}

/// Dispatches `phase` to the matching hook.
pub(crate) fn run_phase(
    handler: &mut dyn RecallHandler,
    phase: Phase,
    cx: &mut StageContext<'_>,
) -> Result<(), RecallError> {
    match phase {
        Phase::InitPre => handler.init_pre(cx),
        Phase::InitInter => handler.init_inter(cx),
        Phase::InitPost => handler.init_post(cx),
        Phase::Automate => handler.automate(cx),
        Phase::Pre => handler.run_pre(cx),
        Phase::Inter => handler.run_inter(cx),
        Phase::Post => handler.run_post(cx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_tables() {
        assert!(Phase::INIT.iter().all(|p| p.is_init()));
        assert!(Phase::RUN.iter().all(|p| !p.is_init()));
        assert_eq!(Phase::InitInter.init_index(), 1);
        assert_eq!(Phase::Inter.to_string(), "run_inter");
    }
}
