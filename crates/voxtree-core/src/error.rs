//! Error types for the recall graph.
//!
//! Only operations invoked from the control side (topology edits, voice
//! allocation) surface errors. Structural tree edits are no-ops on bad input,
//! and failures inside phase hooks are contained to the failing instance.

use thiserror::Error;

use crate::recall::RecallKey;
use crate::topology::{ChannelId, Orientation};

/// Errors returned by [`Engine`](crate::Engine) and [`Audio`](crate::Audio) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced channel line does not exist in the current topology.
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// A voice span must be drawn from the span of the voice it is nested under.
    #[error("span of {0} is not contained in the parent voice span")]
    SpanOutsideParent(String),

    /// The parent voice has already finished and released its context.
    #[error("voice {0} has already finished")]
    VoiceFinished(u64),

    /// A template key did not match any template of any container.
    #[error("template {0} not found")]
    TemplateNotFound(RecallKey),

    /// Topology counts that cannot form an audio object.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// Pad count change for an orientation that would leave no lines behind.
    #[error("cannot remove every {0} pad")]
    EmptyOrientation(Orientation),

    /// The worker pool for parallel ticks could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Error returned by a phase hook.
///
/// The scheduler logs it together with the recall name and phase, moves the
/// instance (and its subtree) to `Done`, and keeps ticking its siblings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RecallError {
    message: String,
}

impl RecallError {
    /// Create a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message passed at construction.
    pub fn message(&self) -> &str {
        &self.message
    }
}
