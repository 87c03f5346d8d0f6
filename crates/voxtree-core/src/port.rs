//! Control ports.
//!
//! A [`Port`] is a named `f32` control value. Ports are created on templates
//! and shared (by `Arc`) with every instance duplicated from them, so a UI that
//! looked up a port once keeps driving every live voice through it.
//!
//! Values are stored as `f32` bits in an `AtomicU32`: reads and writes from
//! the control thread never block the tick. Scheduled automation points sit
//! behind a mutex that the tick only `try_lock`s during the `automate` phase;
//! a busy queue is simply applied on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// Declares a port a recall kind exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSpec {
    /// Control name (`"volume"`, `"delay"`, ...).
    pub name: &'static str,
    /// Initial value.
    pub default: f32,
}

impl PortSpec {
    /// Creates a port spec.
    pub const fn new(name: &'static str, default: f32) -> Self {
        Self { name, default }
    }
}

/// A value to apply once the scheduler reaches `tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPoint {
    /// Tick at (or after) which the value takes effect.
    pub tick: u64,
    /// Target value.
    pub value: f32,
}

/// A named control value shared between a template and its instances.
pub struct Port {
    name: String,
    recall: String,
    default: f32,
    value: AtomicU32,
    automation: Mutex<Vec<AutomationPoint>>,
}

impl Port {
    /// Creates a port for the recall named `recall`.
    pub fn new(recall: impl Into<String>, spec: PortSpec) -> Arc<Self> {
        Arc::new(Self {
            name: spec.name.to_owned(),
            recall: recall.into(),
            default: spec.default,
            value: AtomicU32::new(spec.default.to_bits()),
            automation: Mutex::new(Vec::new()),
        })
    }

    /// Control name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the template recall that owns this port.
    pub fn recall_name(&self) -> &str {
        &self.recall
    }

    /// Value the port was created with.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Sets the value immediately.
    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    /// Queues `value` to be applied at `tick`.
    pub fn schedule(&self, tick: u64, value: f32) {
        let mut points = self.automation.lock();
        let at = points.partition_point(|p| p.tick <= tick);
        points.insert(at, AutomationPoint { tick, value });
    }

    /// Number of automation points not applied yet.
    pub fn pending_automation(&self) -> usize {
        self.automation.lock().len()
    }

    /// Applies every automation point due at `tick`.
    ///
    /// Returns the value applied last, or `None` if nothing was due or the
    /// queue was busy.
    pub fn automate(&self, tick: u64) -> Option<f32> {
        let mut points = self.automation.try_lock()?;
        let due = points.partition_point(|p| p.tick <= tick);
        if due == 0 {
            return None;
        }
        let value = points[due - 1].value;
        points.drain(..due);
        drop(points);
        self.set(value);
        Some(value)
    }
}

impl core::fmt::Debug for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("recall", &self.recall)
            .field("name", &self.name)
            .field("value", &self.get())
            .finish_non_exhaustive()
    }
}
