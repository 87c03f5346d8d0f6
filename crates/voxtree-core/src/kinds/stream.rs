//! Signal playback.

use crate::error::RecallError;
use crate::recall::{RecallHandler, StageContext};

/// Channel-level parent of one [`Stream`] per reachable recycling.
///
/// `Play` itself has no hooks. It completes once every stream child has been
/// pruned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Play;

impl Play {
    /// Kind name.
    pub const NAME: &'static str = "play";
}

impl RecallHandler for Play {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(*self)
    }
}

/// Produces the voice's signal in one recycling.
///
/// A non-persistent stream starts its signal in `init_pre` and completes when
/// the signal has played out (never, if looping). A persistent stream waits
/// for a parent such as [`Pattern`](crate::Pattern) to trigger it. Either way
/// the voice's signals are detached from the recycling on removal.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    looping: bool,
    live: usize,
}

impl Stream {
    /// Kind name.
    pub const NAME: &'static str = "stream";

    /// A stream that loops or plays once.
    pub fn new(looping: bool) -> Self {
        Self { looping, live: 0 }
    }

    /// Whether the signal wraps at the end of its source.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Live signals after the last advance.
    pub fn live(&self) -> usize {
        self.live
    }
}

impl RecallHandler for Stream {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(Self::new(self.looping))
    }

    fn init_pre(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        if cx.is_persistent() {
            return Ok(());
        }
        if let Some(recycling) = cx.recycling()
            && !recycling.trigger(cx.owner(), self.looping)
        {
            tracing::debug!(
                "stream_init: {} has no source for {}",
                recycling.id(),
                cx.recall().name()
            );
        }
        Ok(())
    }

    fn run_inter(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        let Some(recycling) = cx.recycling() else {
            return Ok(());
        };
        self.live = recycling.advance(cx.owner(), cx.block_size());
        if self.live == 0 && !self.looping && !cx.is_persistent() {
            cx.set_done();
        }
        Ok(())
    }

    fn remove(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        if let Some(recycling) = cx.recycling() {
            recycling.detach(cx.owner());
        }
        self.live = 0;
        Ok(())
    }
}
