//! Tempo counters.

use crate::error::RecallError;
use crate::flags::RecallFlags;
use crate::port::PortSpec;
use crate::recall::{RecallHandler, StageContext};

/// Counts blocks and fires every `delay` blocks, starting with the first.
///
/// Exposes a `delay` port (blocks per beat). Runs first among its siblings so
/// counters that depend on it see this tick's value.
#[derive(Debug, Clone, Default)]
pub struct DelayCounter {
    counter: u32,
    fired: bool,
}

impl DelayCounter {
    /// Kind name.
    pub const NAME: &'static str = "delay-counter";

    /// A counter that fires on its first tick.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the counter fired in the current tick.
    pub fn fired(&self) -> bool {
        self.fired
    }
}

impl RecallHandler for DelayCounter {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(self.clone())
    }

    fn port_specs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("delay", 4.0)]
    }

    fn default_flags(&self) -> RecallFlags {
        RecallFlags::RUN_FIRST
    }

    fn run_pre(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        let delay = cx.port_value("delay", 4.0);
        if delay.is_nan() || delay < 1.0 {
            return Err(RecallError::new(format!("delay must be at least 1, got {delay}")));
        }
        let delay = delay as u32;
        self.fired = self.counter == 0;
        self.counter = (self.counter + 1) % delay;
        Ok(())
    }
}

/// Counts the beats of a [`DelayCounter`] dependency.
///
/// Ports: `length` (beats per bar) and `loop` (non-zero to wrap at the end of
/// the bar). A non-looping counter completes after its last beat.
#[derive(Debug, Clone, Default)]
pub struct BeatCounter {
    next: u32,
    beat: Option<u32>,
}

impl BeatCounter {
    /// Kind name.
    pub const NAME: &'static str = "beat-counter";

    /// A counter at the start of the bar.
    pub fn new() -> Self {
        Self::default()
    }

    /// The beat that fired in the current tick.
    pub fn beat(&self) -> Option<u32> {
        self.beat
    }
}

impl RecallHandler for BeatCounter {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(self.clone())
    }

    fn port_specs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("length", 16.0), PortSpec::new("loop", 1.0)]
    }

    fn run_pre(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        self.beat = None;
        let fired = cx
            .dependency_of_kind(DelayCounter::NAME)
            .and_then(|d| d.with_kind(|k| k.as_delay_counter().map(DelayCounter::fired)))
            .unwrap_or(false);
        if !fired {
            return Ok(());
        }
        let length = cx.port_value("length", 16.0).max(1.0) as u32;
        let looping = cx.port_value("loop", 1.0) != 0.0;
        if self.next >= length {
            if looping {
                self.next = 0;
            } else {
                if !cx.is_persistent() {
                    cx.set_done();
                }
                return Ok(());
            }
        }
        self.beat = Some(self.next);
        self.next += 1;
        Ok(())
    }
}
