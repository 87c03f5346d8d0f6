//! Dependency resolution.
//!
//! The second pass of voice construction. For every instance in a freshly
//! duplicated batch, each dependency declared on its template is bound to the
//! instance of the target template that shares the instance's own recall id.
//! Outward dependencies that find nothing there are retried with the recall
//! id of the parent context, exactly one level up.
//!
//! Failures are logged once and recorded; the consuming instance stays inert
//! for that voice. Resolution always finishes for the whole batch before any
//! instance of it is admitted to the scheduler.

use std::sync::Arc;

use crate::container::RecallContainer;
use crate::recall::{Recall, RecallKey, Resolution};
use crate::recall_id::{RecallId, RecallIdKey};

/// A dependency that could not be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    /// Name of the consuming recall.
    pub recall: String,
    /// Voice the consumer belongs to.
    pub recall_id: RecallIdKey,
    /// Template that was looked for.
    pub target: RecallKey,
    /// Whether the parent context was searched as well.
    pub outward: bool,
}

/// Result of resolving one batch.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Dependencies bound.
    pub resolved: usize,
    /// Dependencies left unresolved.
    pub unresolved: Vec<UnresolvedDependency>,
}

impl ResolutionReport {
    /// Returns `true` if every dependency was bound.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Adds another report's counts to this one.
    pub fn merge(&mut self, other: ResolutionReport) {
        self.resolved += other.resolved;
        self.unresolved.extend(other.unresolved);
    }
}

/// Resolves the pending dependencies of every instance in `batch`.
///
/// Entries that are already resolved or unresolved are left alone, so a batch
/// can be resolved again after more instances were added.
pub fn resolve_batch(containers: &[Arc<RecallContainer>], batch: &[Arc<Recall>]) -> ResolutionReport {
    let mut report = ResolutionReport::default();
    for instance in batch {
        let Some(recall_id) = instance.recall_id() else {
            continue;
        };
        let pending: Vec<usize> = instance
            .resolutions()
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Resolution::Pending))
            .map(|(i, _)| i)
            .collect();
        for index in pending {
            let dependency = instance.dependencies()[index];
            match lookup(containers, dependency.target, recall_id, dependency.outward) {
                Some(target) => {
                    tracing::debug!(
                        "resolve: {} -> {} for {}",
                        instance.name(),
                        target.name(),
                        recall_id.key()
                    );
                    instance.set_resolution(index, Resolution::Resolved(target));
                    report.resolved += 1;
                }
                None => {
                    tracing::warn!(
                        recall = instance.name(),
                        target = %dependency.target,
                        recall_id = %recall_id.key(),
                        outward = dependency.outward,
                        "unresolved dependency; recall stays inert for this voice"
                    );
                    instance.set_resolution(index, Resolution::Unresolved);
                    report.unresolved.push(UnresolvedDependency {
                        recall: instance.name().to_owned(),
                        recall_id: recall_id.key(),
                        target: dependency.target,
                        outward: dependency.outward,
                    });
                }
            }
        }
    }
    report
}

fn lookup(
    containers: &[Arc<RecallContainer>],
    target: RecallKey,
    recall_id: &Arc<RecallId>,
    outward: bool,
) -> Option<Arc<Recall>> {
    let container = containers.iter().find(|c| c.template(target).is_some())?;
    if let Some(found) = container.find_instance(target, recall_id.key()) {
        return Some(found);
    }
    if !outward {
        return None;
    }
    let parent = recall_id.parent()?;
    container.find_instance(target, parent.key())
}
