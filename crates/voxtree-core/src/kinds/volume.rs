//! Gain stage.

use crate::error::RecallError;
use crate::port::PortSpec;
use crate::recall::{RecallHandler, StageContext};

/// Scales the voice's signals by the `volume` port in `run_post`.
///
/// Only instances bound to a recycling do any work; the channel-level parent
/// carries the port its children share. A non-persistent recycling-level
/// volume completes once the voice no longer has signals in its recycling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Volume;

impl Volume {
    /// Kind name.
    pub const NAME: &'static str = "volume";

    /// A unity-gain volume.
    pub fn new() -> Self {
        Self
    }
}

impl RecallHandler for Volume {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(*self)
    }

    fn port_specs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("volume", 1.0)]
    }

    fn run_post(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        let Some(recycling) = cx.recycling() else {
            return Ok(());
        };
        let owner = cx.owner();
        if recycling.signals_of(owner) == 0 {
            if !cx.is_persistent() {
                cx.set_done();
            }
            return Ok(());
        }
        let gain = cx.port_value("volume", 1.0);
        if gain != 1.0 {
            recycling.scale(owner, gain);
        }
        Ok(())
    }
}
