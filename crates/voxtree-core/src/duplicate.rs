//! Template → instance duplication.
//!
//! Duplication is the first half of the two-pass protocol that builds a
//! voice: every relevant template is copied into an instance for the voice's
//! [`RecallId`], without wiring dependencies. The resolver runs afterwards
//! over the whole batch (see [`resolve`](crate::resolve)).

use std::sync::Arc;

use crate::container::RecallContainer;
use crate::flags::Lifecycle;
use crate::recall::{Recall, RecallLevel};
use crate::recall_id::RecallId;
use crate::recycling::Recycling;
use crate::topology::ChannelId;

/// Outcome of a successful duplication.
#[derive(Debug, Clone)]
pub enum Duplicate {
    /// A new instance was created and registered.
    Fresh(Arc<Recall>),
    /// The (template, recall id) pair already had an instance.
    Existing(Arc<Recall>),
}

impl Duplicate {
    /// The instance, fresh or existing.
    pub fn instance(&self) -> &Arc<Recall> {
        match self {
            Self::Fresh(i) | Self::Existing(i) => i,
        }
    }

    /// Consumes the outcome, returning the instance.
    pub fn into_instance(self) -> Arc<Recall> {
        match self {
            Self::Fresh(i) | Self::Existing(i) => i,
        }
    }

    /// Returns `true` if the instance was created by this call.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

impl RecallContainer {
    /// Returns the instance of `template` for `recall_id`, creating it if
    /// needed.
    ///
    /// Returns `None` when the template does not apply to the voice: its
    /// scope does not intersect the id's scope, or its bound channel has no
    /// recycling inside the id's context. Foreign templates and fan-out
    /// children are ignored the same way.
    pub fn duplicate(&self, template: &Arc<Recall>, recall_id: &Arc<RecallId>) -> Option<Arc<Recall>> {
        self.duplicate_with_status(template, recall_id)
            .map(Duplicate::into_instance)
    }

    /// Like [`duplicate()`](Self::duplicate), telling fresh and existing
    /// instances apart.
    pub fn duplicate_with_status(
        &self,
        template: &Arc<Recall>,
        recall_id: &Arc<RecallId>,
    ) -> Option<Duplicate> {
        let owned = template
            .container()
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(&c), self));
        if !owned || !template.is_template() || template.level() == RecallLevel::Recycling {
            tracing::debug!("duplicate: {} is not a template of {}", template.name(), self.name());
            return None;
        }
        if !template.scope().intersects(recall_id.scope()) {
            return None;
        }
        if let Some(existing) = self.find_instance(template.key(), recall_id.key()) {
            return Some(Duplicate::Existing(existing));
        }

        let span = recall_id.context().recycling();
        let reachable = fan_out_span(template.channel(), &span);
        if template.level() == RecallLevel::Channel && reachable.is_empty() {
            tracing::debug!(
                "duplicate: {} unreachable from {}",
                template.name(),
                recall_id.key()
            );
            return None;
        }

        let instance = Recall::instantiate(template, recall_id, None);
        if let Some(child_template) = template.child_template() {
            for recycling in reachable {
                instance.add_child(Recall::instantiate(
                    child_template,
                    recall_id,
                    Some(recycling),
                ));
            }
        }

        match self.register(Arc::clone(&instance)) {
            Ok(()) => {
                tracing::debug!(
                    "duplicate: {} for {} ({} children)",
                    template.name(),
                    recall_id.key(),
                    instance.children().len()
                );
                Some(Duplicate::Fresh(instance))
            }
            Err(existing) => Some(Duplicate::Existing(existing)),
        }
    }
}

/// Recyclings of `span` a recall bound to `channel` fans out over.
///
/// Unbound (audio-level) recalls fan out over the whole span.
pub(crate) fn fan_out_span(channel: Option<ChannelId>, span: &[Arc<Recycling>]) -> Vec<Arc<Recycling>> {
    match channel {
        Some(channel) => span
            .iter()
            .filter(|r| r.channel() == channel)
            .cloned()
            .collect(),
        None => span.to_vec(),
    }
}

/// Brings a fanned-out instance's children in line with its current context.
///
/// Children whose recycling is no longer reachable are cancelled. Recyclings
/// that were not part of `previous` (the context span before the edit) get a
/// fresh child; a child that already finished is not brought back. Returns
/// (added, cancelled).
pub(crate) fn refresh_fan_out(instance: &Arc<Recall>, previous: &[Arc<Recycling>]) -> (usize, usize) {
    let (Some(child_template), Some(recall_id)) = (instance.child_template(), instance.recall_id())
    else {
        return (0, 0);
    };
    if instance.state() >= Lifecycle::Done || instance.is_cancel_requested() {
        return (0, 0);
    }
    let desired = fan_out_span(instance.channel(), &recall_id.context().recycling());
    let children = instance.children();

    let mut cancelled = 0;
    for child in children.iter() {
        let reachable = child
            .recycling()
            .is_some_and(|r| desired.iter().any(|d| d.id() == r.id()));
        if !reachable && !child.is_cancel_requested() {
            child.cancel(false);
            cancelled += 1;
        }
    }

    let mut added = 0;
    for recycling in desired {
        let known = previous.iter().any(|p| p.id() == recycling.id());
        let covered = children.iter().any(|c| {
            !c.is_cancel_requested() && c.recycling().is_some_and(|r| r.id() == recycling.id())
        });
        if !known && !covered {
            instance.add_child(Recall::instantiate(child_template, recall_id, Some(recycling)));
            added += 1;
        }
    }
    if added + cancelled > 0 {
        tracing::debug!(
            "fan_out_refresh: {} for {} (+{added} -{cancelled})",
            instance.name(),
            recall_id.key()
        );
    }
    (added, cancelled)
}
