//! Recycling context tree.
//!
//! A [`RecyclingContext`] is an ordered view over a span of recyclings, one per
//! active voice or sub-processing scope. Contexts form a tree that mirrors the
//! voice nesting: a whole-audio context at the top, channel voices below it,
//! and per-note voices below those.
//!
//! # Invariants
//!
//! - A child's span is an order-preserving subset of its parent's span.
//! - Parent and child links are edited together under the parent's lock:
//!   the parent lists the child if and only if the child points at the parent.
//! - No edit drops a recycling from a span while a child context still uses
//!   it. Shrinking goes bottom-up: children first.
//!
//! # Copy-on-write spans
//!
//! Span arrays are never mutated in place. Every edit builds a new array and
//! publishes it atomically (`ArcSwap`), so a reader that loaded the previous
//! array keeps a complete, consistent copy. Edits that change the span length
//! through [`replace_recycling()`](RecyclingContext::replace_recycling) go one
//! step further and produce a *replacement context* that is swapped into the
//! parent's child list; the old context stays alive and unchanged for as long
//! as anyone holds it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::recall_id::RecallId;
use crate::recycling::{Recycling, is_ordered_subset};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// A tree-scoped, ordered view over a span of recyclings.
pub struct RecyclingContext {
    serial: u64,
    recall_id: Weak<RecallId>,
    recycling: ArcSwap<Vec<Arc<Recycling>>>,
    parent: RwLock<Weak<RecyclingContext>>,
    children: ArcSwap<Vec<Arc<RecyclingContext>>>,
    /// Serializes structural edits of this node (span and child list).
    lock: Mutex<()>,
}

impl RecyclingContext {
    pub(crate) fn new(span: Vec<Arc<Recycling>>, recall_id: Weak<RecallId>) -> Arc<Self> {
        Arc::new(Self {
            serial: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            recall_id,
            recycling: ArcSwap::from_pointee(span),
            parent: RwLock::new(Weak::new()),
            children: ArcSwap::from_pointee(Vec::new()),
            lock: Mutex::new(()),
        })
    }

    /// Process-wide serial number, for logging.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Snapshot of the span.
    pub fn recycling(&self) -> Arc<Vec<Arc<Recycling>>> {
        self.recycling.load_full()
    }

    /// Length of the span.
    pub fn len(&self) -> usize {
        self.recycling.load().len()
    }

    /// Returns `true` if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.recycling.load().is_empty()
    }

    /// The recall id this context belongs to.
    pub fn recall_id(&self) -> Option<Arc<RecallId>> {
        self.recall_id.upgrade()
    }

    /// The parent context, if attached.
    pub fn parent(&self) -> Option<Arc<RecyclingContext>> {
        self.parent.read().upgrade()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Arc<Vec<Arc<RecyclingContext>>> {
        self.children.load_full()
    }

    /// Number of ancestors above this context.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(ctx) = current {
            depth += 1;
            current = ctx.parent();
        }
        depth
    }

    /// Walks parent links up to the root of the tree.
    pub fn get_toplevel(self: &Arc<Self>) -> Arc<Self> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Position of `recycling` in this context's span.
    pub fn find(&self, recycling: &Recycling) -> Option<usize> {
        self.recycling
            .load()
            .iter()
            .position(|r| r.id() == recycling.id())
    }

    /// Index of the first child whose span contains `recycling`.
    pub fn find_in_children(&self, recycling: &Recycling) -> Option<usize> {
        self.children
            .load()
            .iter()
            .position(|c| c.find(recycling).is_some())
    }

    /// Position of `recycling` in the parent's span.
    pub fn find_in_parent(&self, recycling: &Recycling) -> Option<usize> {
        self.parent()?.find(recycling)
    }

    /// Appends `recycling` to the span.
    ///
    /// No-op (returns `false`) if it is already a member or if the parent's
    /// span does not contain it after this context's last element.
    pub fn add(&self, recycling: Arc<Recycling>) -> bool {
        let len = self.len();
        self.insert(recycling, len)
    }

    /// Inserts `recycling` at `position` in the span.
    ///
    /// No-op (returns `false`) for out-of-range positions, existing members,
    /// or insertions that would break the ordering against the parent span.
    pub fn insert(&self, recycling: Arc<Recycling>, position: usize) -> bool {
        let _guard = self.lock.lock();
        let current = self.recycling.load_full();
        if position > current.len() || current.iter().any(|r| r.id() == recycling.id()) {
            tracing::debug!("context_insert: ignored for context {}", self.serial);
            return false;
        }
        let mut span = Vec::with_capacity(current.len() + 1);
        span.extend_from_slice(&current[..position]);
        span.push(recycling);
        span.extend_from_slice(&current[position..]);
        if !self.fits_parent(&span) {
            tracing::debug!("context_insert: outside parent span for {}", self.serial);
            return false;
        }
        self.recycling.store(Arc::new(span));
        true
    }

    /// Removes `recycling` from the span.
    ///
    /// No-op (returns `false`) if it is not a member or a child context
    /// still references it.
    pub fn remove(&self, recycling: &Recycling) -> bool {
        let _guard = self.lock.lock();
        let current = self.recycling.load_full();
        let Some(position) = current.iter().position(|r| r.id() == recycling.id()) else {
            return false;
        };
        if self.find_in_children(recycling).is_some() {
            tracing::debug!(
                "context_remove: {} still referenced by a child of {}",
                recycling.id(),
                self.serial
            );
            return false;
        }
        let mut span = Vec::with_capacity(current.len() - 1);
        span.extend_from_slice(&current[..position]);
        span.extend_from_slice(&current[position + 1..]);
        self.recycling.store(Arc::new(span));
        true
    }

    /// Replaces the contiguous run `old_span` with `new_span`.
    ///
    /// Returns the context that now carries the span:
    ///
    /// - equal lengths: the array of `self` is swapped in place and `self`
    ///   is returned;
    /// - different lengths: a replacement context is built with the same
    ///   recall id, parent and children, spliced into the parent's child list
    ///   in place of `self`, and returned. `self` is left intact.
    ///
    /// Returns `None` (no-op) when `old_span` is empty, does not occur
    /// contiguously in the span, the result would leave the parent span, or
    /// a child context still uses a recycling the result drops.
    pub fn replace_recycling(
        self: &Arc<Self>,
        old_span: &[Arc<Recycling>],
        new_span: &[Arc<Recycling>],
    ) -> Option<Arc<Self>> {
        if old_span.is_empty() {
            return None;
        }
        let guard = self.lock.lock();
        let current = self.recycling.load_full();
        let Some(start) = find_run(&current, old_span) else {
            tracing::debug!("context_replace: old span not found in {}", self.serial);
            return None;
        };
        self.splice(guard, &current, start, old_span.len(), new_span)
    }

    /// Replaces the whole span with `span`, as [`replace_recycling()`] would.
    ///
    /// [`replace_recycling()`]: Self::replace_recycling
    pub fn replace_span(self: &Arc<Self>, span: &[Arc<Recycling>]) -> Option<Arc<Self>> {
        let guard = self.lock.lock();
        let current = self.recycling.load_full();
        if same_span(&current, span) {
            return Some(Arc::clone(self));
        }
        self.splice(guard, &current, 0, current.len(), span)
    }

    /// Publishes the spliced span. `guard` is this node's lock, held until
    /// the replacement is visible in the parent's child list.
    fn splice(
        self: &Arc<Self>,
        guard: MutexGuard<'_, ()>,
        current: &[Arc<Recycling>],
        start: usize,
        old_len: usize,
        new_span: &[Arc<Recycling>],
    ) -> Option<Arc<Self>> {
        let mut span = Vec::with_capacity(current.len() - old_len + new_span.len());
        span.extend_from_slice(&current[..start]);
        span.extend_from_slice(new_span);
        span.extend_from_slice(&current[start + old_len..]);
        if !self.fits_parent(&span) {
            tracing::debug!("context_replace: result leaves parent span of {}", self.serial);
            return None;
        }
        let children = self.children.load_full();
        if let Some(child) = children
            .iter()
            .find(|c| !is_ordered_subset(&c.recycling(), &span))
        {
            tracing::debug!(
                "context_replace: child {} of {} would leave the span",
                child.serial,
                self.serial
            );
            return None;
        }

        if old_len == new_span.len() {
            self.recycling.store(Arc::new(span));
            tracing::debug!("context_replace: in place for {}", self.serial);
            return Some(Arc::clone(self));
        }

        let replacement = Arc::new(Self {
            serial: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            recall_id: self.recall_id.clone(),
            recycling: ArcSwap::from_pointee(span),
            parent: RwLock::new(self.parent.read().clone()),
            children: ArcSwap::new(children),
            lock: Mutex::new(()),
        });
        for child in replacement.children.load().iter() {
            *child.parent.write() = Arc::downgrade(&replacement);
        }
        // child before parent, as in every other two-node edit
        if let Some(parent) = self.parent()
            && !parent.substitute_child(self, &replacement)
        {
            *replacement.parent.write() = Weak::new();
        }
        if let Some(recall_id) = self.recall_id.upgrade()
            && Arc::ptr_eq(&recall_id.context(), self)
        {
            recall_id.set_context(Arc::clone(&replacement));
        }
        drop(guard);
        tracing::debug!(
            "context_replace: {} -> {} ({} -> {} recyclings)",
            self.serial,
            replacement.serial,
            current.len(),
            replacement.len()
        );
        Some(replacement)
    }

    /// Attaches `child` below this context.
    ///
    /// No-op (returns `false`) if the child already has a parent, is an
    /// ancestor of `self`, or its span is not drawn from this span.
    pub fn add_child(self: &Arc<Self>, child: &Arc<Self>) -> bool {
        if Arc::ptr_eq(self, child) || self.has_ancestor(child) {
            return false;
        }
        let _guard = self.lock.lock();
        let mut parent = child.parent.write();
        if parent.upgrade().is_some() {
            tracing::debug!("context_add_child: {} already parented", child.serial);
            return false;
        }
        if !is_ordered_subset(&child.recycling(), &self.recycling()) {
            tracing::debug!(
                "context_add_child: span of {} not inside {}",
                child.serial,
                self.serial
            );
            return false;
        }
        let mut children = Vec::clone(&self.children.load());
        children.push(Arc::clone(child));
        self.children.store(Arc::new(children));
        *parent = Arc::downgrade(self);
        tracing::debug!("context_add_child: {} under {}", child.serial, self.serial);
        true
    }

    /// Detaches `child` from this context.
    ///
    /// Returns `false` if `child` is not listed here.
    pub fn remove_child(&self, child: &Arc<Self>) -> bool {
        let _guard = self.lock.lock();
        let current = self.children.load_full();
        let Some(position) = current.iter().position(|c| Arc::ptr_eq(c, child)) else {
            return false;
        };
        let mut children = Vec::clone(&current);
        children.remove(position);
        self.children.store(Arc::new(children));
        let mut parent = child.parent.write();
        if std::ptr::eq(parent.as_ptr(), self) {
            *parent = Weak::new();
        }
        tracing::debug!("context_remove_child: {} from {}", child.serial, self.serial);
        true
    }

    fn substitute_child(&self, old: &Arc<Self>, new: &Arc<Self>) -> bool {
        let _guard = self.lock.lock();
        let current = self.children.load_full();
        let Some(position) = current.iter().position(|c| Arc::ptr_eq(c, old)) else {
            return false;
        };
        let mut children = Vec::clone(&current);
        children[position] = Arc::clone(new);
        self.children.store(Arc::new(children));
        true
    }

    fn has_ancestor(&self, candidate: &Arc<Self>) -> bool {
        let mut current = self.parent();
        while let Some(ctx) = current {
            if Arc::ptr_eq(&ctx, candidate) {
                return true;
            }
            current = ctx.parent();
        }
        false
    }

    fn fits_parent(&self, span: &[Arc<Recycling>]) -> bool {
        self.parent()
            .is_none_or(|parent| is_ordered_subset(span, &parent.recycling()))
    }
}

impl core::fmt::Debug for RecyclingContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecyclingContext")
            .field("serial", &self.serial)
            .field("len", &self.len())
            .field("children", &self.children.load().len())
            .finish_non_exhaustive()
    }
}

/// Start index of `run` as a contiguous run inside `span`.
fn find_run(span: &[Arc<Recycling>], run: &[Arc<Recycling>]) -> Option<usize> {
    if run.len() > span.len() {
        return None;
    }
    (0..=span.len() - run.len()).find(|&start| same_span(&span[start..start + run.len()], run))
}

pub(crate) fn same_span(a: &[Arc<Recycling>], b: &[Arc<Recycling>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id() == y.id())
}
