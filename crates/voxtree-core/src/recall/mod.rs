//! Recalls: templates and their per-voice instances.
//!
//! A [`Recall`] is one processing unit. Templates are built once per
//! instrument through a [`TemplateBuilder`] and registered with a
//! [`RecallContainer`]; instances are duplicated from them for every voice
//! ([`RecallId`]) they are relevant to. Both share this type and are told apart
//! by [`RecallFlags::TEMPLATE`] and the [`Lifecycle`] state.
//!
//! Instances form a tree per voice: audio-level instances at the top,
//! channel-level instances below the container's head instance, and one
//! recycling-level child per reachable recycling below any instance whose
//! template declares a fan-out kind.
//!
//! # Locking
//!
//! Each recall has its own locks and nothing is shared across recalls:
//!
//! - the kind mutex, held while one of its hooks runs;
//! - the structure mutex, held while its child list is edited.
//!
//! Hooks may lock the kind of a resolved dependency to read its state.
//! Dependencies never lock their consumers.

mod handler;

pub use handler::{Phase, RecallHandler, StageContext};
pub(crate) use handler::run_phase;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::container::RecallContainer;
use crate::flags::{AtomicLifecycle, Lifecycle, RecallFlags};
use crate::kinds::RecallKind;
use crate::port::Port;
use crate::recall_id::{RecallId, SoundScope};
use crate::recycling::Recycling;
use crate::topology::ChannelId;

static NEXT_TEMPLATE: AtomicU64 = AtomicU64::new(1);
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Identifies a template. Instances carry the key of the template they were
/// duplicated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecallKey(u64);

impl RecallKey {
    fn next() -> Self {
        Self(NEXT_TEMPLATE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric key.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RecallKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Recall({})", self.0)
    }
}

/// Where in the topology a recall operates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecallLevel {
    /// Once per voice, over the whole context span.
    Audio,
    /// Once per voice, for one bound channel.
    Channel,
    /// Once per reachable recycling (fan-out children).
    Recycling,
}

impl RecallLevel {
    /// Lowercase name, as used in instrument descriptions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Channel => "channel",
            Self::Recycling => "recycling",
        }
    }
}

impl core::fmt::Display for RecallLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency declared on a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    /// Template whose instance is wanted.
    pub target: RecallKey,
    /// Also look one parent context up when the voice itself has no match.
    pub outward: bool,
}

/// Resolution state of one declared dependency on an instance.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// Not looked up yet.
    Pending,
    /// Bound to a sibling instance.
    Resolved(Arc<Recall>),
    /// Lookup failed; the instance stays inert.
    Unresolved,
}

/// A processing unit: a template or one of its instances.
pub struct Recall {
    key: RecallKey,
    serial: u64,
    name: String,
    kind_name: &'static str,
    level: RecallLevel,
    flags: RecallFlags,
    scope: SoundScope,

    state: AtomicLifecycle,
    init_progress: AtomicU8,
    cancel_requested: AtomicBool,

    kind: Mutex<RecallKind>,

    structure: Mutex<()>,
    children: ArcSwap<Vec<Arc<Recall>>>,
    parent: RwLock<Weak<Recall>>,

    template: Weak<Recall>,
    container: Weak<RecallContainer>,
    recall_id: Option<Arc<RecallId>>,
    channel: Option<ChannelId>,
    recycling: Option<Arc<Recycling>>,

    dependencies: Vec<Dependency>,
    resolved: Mutex<Vec<Resolution>>,
    child_template: Option<Arc<Recall>>,
    ports: Vec<Arc<Port>>,
}

impl Recall {
    /// Template key (shared by all instances of one template).
    pub fn key(&self) -> RecallKey {
        self.key
    }

    /// Process-wide serial, unique per object.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind name of the handler.
    pub fn kind_name(&self) -> &'static str {
        self.kind_name
    }

    /// Topology level.
    pub fn level(&self) -> RecallLevel {
        self.level
    }

    /// Behavioral flags.
    pub fn flags(&self) -> RecallFlags {
        self.flags
    }

    /// Sound scopes this recall takes part in.
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.state.load()
    }

    /// Returns `true` for templates.
    pub fn is_template(&self) -> bool {
        self.flags.contains(RecallFlags::TEMPLATE)
    }

    /// Returns `true` if the instance completes only through cancel.
    pub fn is_persistent(&self) -> bool {
        self.flags.contains(RecallFlags::PERSISTENT)
    }

    /// Bound channel of a channel-level (or fan-out) recall.
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Bound recycling of a recycling-level instance.
    pub fn recycling(&self) -> Option<&Arc<Recycling>> {
        self.recycling.as_ref()
    }

    /// Recall id of an instance.
    pub fn recall_id(&self) -> Option<&Arc<RecallId>> {
        self.recall_id.as_ref()
    }

    /// Template an instance was duplicated from.
    pub fn template(&self) -> Option<Arc<Recall>> {
        self.template.upgrade()
    }

    /// Container the recall belongs to.
    pub fn container(&self) -> Option<Arc<RecallContainer>> {
        self.container.upgrade()
    }

    /// Parent instance in the instance tree.
    pub fn parent(&self) -> Option<Arc<Recall>> {
        self.parent.read().upgrade()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Arc<Vec<Arc<Recall>>> {
        self.children.load_full()
    }

    /// Template used for per-recycling children, if this recall fans out.
    pub fn child_template(&self) -> Option<&Arc<Recall>> {
        self.child_template.as_ref()
    }

    /// Returns `true` if this recall creates one child per recycling.
    pub fn is_fanned_out(&self) -> bool {
        self.child_template.is_some()
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Ports shared with the template.
    pub fn ports(&self) -> &[Arc<Port>] {
        &self.ports
    }

    /// Port by control name.
    pub fn port(&self, name: &str) -> Option<&Arc<Port>> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Snapshot of the resolution state, one entry per declared dependency.
    pub fn resolutions(&self) -> Vec<Resolution> {
        self.resolved.lock().clone()
    }

    /// Resolved instances, `None` where unresolved or still pending.
    pub fn resolved_dependencies(&self) -> Vec<Option<Arc<Recall>>> {
        self.resolved
            .lock()
            .iter()
            .map(|r| match r {
                Resolution::Resolved(recall) => Some(Arc::clone(recall)),
                _ => None,
            })
            .collect()
    }

    /// The resolved instance for the `index`-th declared dependency.
    pub fn dependency(&self, index: usize) -> Option<Arc<Recall>> {
        match self.resolved.lock().get(index) {
            Some(Resolution::Resolved(recall)) => Some(Arc::clone(recall)),
            _ => None,
        }
    }

    /// Returns `true` if a dependency failed to resolve. Inert instances
    /// are traversed but their hooks are skipped.
    pub fn is_inert(&self) -> bool {
        self.resolved
            .lock()
            .iter()
            .any(|r| matches!(r, Resolution::Unresolved))
    }

    /// Runs `f` with the kind locked.
    pub fn with_kind<R>(&self, f: impl FnOnce(&RecallKind) -> R) -> R {
        f(&self.kind.lock())
    }

    /// Requests cooperative cancellation.
    ///
    /// The flag is observed the next time the scheduler visits the instance.
    /// With `propagate`, every ancestor up to the voice root is cancelled as
    /// well, not only the direct parent. No-op on templates.
    pub fn cancel(&self, propagate: bool) {
        if self.is_template() {
            return;
        }
        self.cancel_requested.store(true, Ordering::Release);
        if propagate {
            let mut current = self.parent();
            while let Some(parent) = current {
                parent.cancel_requested.store(true, Ordering::Release);
                current = parent.parent();
            }
        }
    }

    /// Returns `true` once cancel has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub(crate) fn lock_kind(&self) -> parking_lot::MutexGuard<'_, RecallKind> {
        self.kind.lock()
    }

    pub(crate) fn advance(&self, next: Lifecycle) -> bool {
        self.state.advance(next)
    }

    pub(crate) fn init_progress(&self) -> u8 {
        self.init_progress.load(Ordering::Acquire)
    }

    pub(crate) fn set_init_progress(&self, progress: u8) {
        self.init_progress.store(progress, Ordering::Release);
    }

    pub(crate) fn rank(&self) -> u8 {
        self.flags.rank()
    }

    pub(crate) fn set_resolution(&self, index: usize, resolution: Resolution) {
        if let Some(slot) = self.resolved.lock().get_mut(index) {
            *slot = resolution;
        }
    }

    /// Moves this instance and its whole subtree to `Done`.
    pub(crate) fn mark_subtree_done(&self) {
        self.advance(Lifecycle::Done);
        for child in self.children.load().iter() {
            child.mark_subtree_done();
        }
    }

    /// Appends `child`, keeping run-first/run-last order, and sets its parent.
    pub(crate) fn add_child(self: &Arc<Self>, child: Arc<Recall>) {
        let _guard = self.structure.lock();
        let mut children = Vec::clone(&self.children.load());
        let at = children.partition_point(|c| c.rank() <= child.rank());
        *child.parent.write() = Arc::downgrade(self);
        children.insert(at, child);
        self.children.store(Arc::new(children));
    }

    /// Detaches `child`, clearing its parent link in the same step.
    pub(crate) fn remove_child(&self, child: &Arc<Recall>) -> bool {
        let _guard = self.structure.lock();
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
        true
    }

    /// Builds an instance of `template` for `recall_id`.
    ///
    /// The kind is duplicated fresh from the template, ports are shared, and
    /// every dependency starts out pending. Fan-out children are not created
    /// here.
    pub(crate) fn instantiate(
        template: &Arc<Recall>,
        recall_id: &Arc<RecallId>,
        recycling: Option<Arc<Recycling>>,
    ) -> Arc<Recall> {
        let kind = template.kind.lock().duplicate();
        Arc::new(Recall {
            key: template.key,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: template.name.clone(),
            kind_name: template.kind_name,
            level: template.level,
            flags: template.flags.without(RecallFlags::TEMPLATE),
            scope: template.scope,
            state: AtomicLifecycle::new(Lifecycle::Pending),
            init_progress: AtomicU8::new(0),
            cancel_requested: AtomicBool::new(false),
            kind: Mutex::new(kind),
            structure: Mutex::new(()),
            children: ArcSwap::from_pointee(Vec::new()),
            parent: RwLock::new(Weak::new()),
            template: Arc::downgrade(template),
            container: template.container.clone(),
            recall_id: Some(Arc::clone(recall_id)),
            channel: recycling.as_ref().map(|r| r.channel()).or(template.channel),
            recycling,
            dependencies: template.dependencies.clone(),
            resolved: Mutex::new(vec![Resolution::Pending; template.dependencies.len()]),
            child_template: template.child_template.clone(),
            ports: template.ports.clone(),
        })
    }
}

impl core::fmt::Debug for Recall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recall")
            .field("name", &self.name)
            .field("kind", &self.kind_name)
            .field("level", &self.level)
            .field("state", &self.state())
            .field("recall_id", &self.recall_id.as_ref().map(|id| id.key()))
            .finish_non_exhaustive()
    }
}

/// Builds a template recall.
///
/// # Example
///
/// ```rust
/// use voxtree_core::{
///     ChannelId, DelayCounter, RecallContainer, RecallKind, Stream, TemplateBuilder, Play,
/// };
///
/// let container = RecallContainer::new("sampler");
/// let delay = container.add_template(TemplateBuilder::audio(
///     "delay",
///     RecallKind::DelayCounter(DelayCounter::new()),
/// ));
/// let play = container.add_template(
///     TemplateBuilder::channel("play", ChannelId::input(0), RecallKind::Play(Play))
///         .depends_on(&delay)
///         .fan_out(RecallKind::Stream(Stream::new(false))),
/// );
/// assert!(play.is_fanned_out());
/// assert_eq!(play.dependencies()[0].target, delay.key());
/// ```
pub struct TemplateBuilder {
    name: String,
    kind: RecallKind,
    level: RecallLevel,
    channel: Option<ChannelId>,
    flags: RecallFlags,
    scope: SoundScope,
    dependencies: Vec<Dependency>,
    child: Option<RecallKind>,
}

impl TemplateBuilder {
    /// An audio-level template.
    pub fn audio(name: impl Into<String>, kind: RecallKind) -> Self {
        Self::with_level(name.into(), kind, RecallLevel::Audio, None)
    }

    /// A channel-level template bound to `channel`.
    pub fn channel(name: impl Into<String>, channel: ChannelId, kind: RecallKind) -> Self {
        Self::with_level(name.into(), kind, RecallLevel::Channel, Some(channel))
    }

    fn with_level(
        name: String,
        kind: RecallKind,
        level: RecallLevel,
        channel: Option<ChannelId>,
    ) -> Self {
        Self {
            name,
            kind,
            level,
            channel,
            flags: RecallFlags::NONE,
            scope: SoundScope::default(),
            dependencies: Vec::new(),
            child: None,
        }
    }

    /// Sets the sound scopes (default: playback).
    pub fn scope(mut self, scope: SoundScope) -> Self {
        self.scope = scope;
        self
    }

    /// Adds behavioral flags.
    pub fn flags(mut self, flags: RecallFlags) -> Self {
        self.flags = self.flags.union(flags.without(RecallFlags::TEMPLATE));
        self
    }

    /// Declares a dependency on the instance of `target` in the same voice.
    pub fn depends_on(self, target: &Recall) -> Self {
        self.depends_on_key(target.key(), false)
    }

    /// Declares a dependency that may also resolve one parent context up.
    pub fn depends_on_outward(self, target: &Recall) -> Self {
        self.depends_on_key(target.key(), true)
    }

    /// Declares a dependency by template key.
    pub fn depends_on_key(mut self, target: RecallKey, outward: bool) -> Self {
        self.dependencies.push(Dependency { target, outward });
        self
    }

    /// Creates one `child` instance per reachable recycling.
    pub fn fan_out(mut self, child: RecallKind) -> Self {
        self.child = Some(child);
        self
    }

    pub(crate) fn build(self, container: Weak<RecallContainer>) -> Arc<Recall> {
        let flags = self
            .flags
            .union(self.kind.handler().default_flags())
            .union(RecallFlags::TEMPLATE);
        let ports: Vec<Arc<Port>> = self
            .kind
            .handler()
            .port_specs()
            .into_iter()
            .map(|spec| Port::new(self.name.clone(), spec))
            .collect();

        let child_template = self.child.map(|child| {
            let inherited = flags
                .without(RecallFlags::RUN_FIRST)
                .without(RecallFlags::RUN_LAST)
                .union(child.handler().default_flags());
            let mut child_ports = Vec::new();
            for spec in child.handler().port_specs() {
                let port = ports
                    .iter()
                    .find(|p| p.name() == spec.name)
                    .cloned()
                    .unwrap_or_else(|| Port::new(self.name.clone(), spec));
                child_ports.push(port);
            }
            Arc::new(Recall::from_parts(TemplateParts {
                name: self.name.clone(),
                kind: child,
                level: RecallLevel::Recycling,
                flags: inherited,
                scope: self.scope,
                channel: self.channel,
                container: container.clone(),
                dependencies: Vec::new(),
                child_template: None,
                ports: child_ports,
            }))
        });

        Arc::new(Recall::from_parts(TemplateParts {
            name: self.name,
            kind: self.kind,
            level: self.level,
            flags,
            scope: self.scope,
            channel: self.channel,
            container,
            dependencies: self.dependencies,
            child_template,
            ports,
        }))
    }
}

struct TemplateParts {
    name: String,
    kind: RecallKind,
    level: RecallLevel,
    flags: RecallFlags,
    scope: SoundScope,
    channel: Option<ChannelId>,
    container: Weak<RecallContainer>,
    dependencies: Vec<Dependency>,
    child_template: Option<Arc<Recall>>,
    ports: Vec<Arc<Port>>,
}

impl Recall {
    fn from_parts(parts: TemplateParts) -> Recall {
        let kind_name = parts.kind.name();
        Recall {
            key: RecallKey::next(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: parts.name,
            kind_name,
            level: parts.level,
            flags: parts.flags.union(RecallFlags::TEMPLATE),
            scope: parts.scope,
            state: AtomicLifecycle::new(Lifecycle::Template),
            init_progress: AtomicU8::new(0),
            cancel_requested: AtomicBool::new(false),
            kind: Mutex::new(parts.kind),
            structure: Mutex::new(()),
            children: ArcSwap::from_pointee(Vec::new()),
            parent: RwLock::new(Weak::new()),
            template: Weak::new(),
            container: parts.container,
            recall_id: None,
            channel: parts.channel,
            recycling: None,
            resolved: Mutex::new(Vec::new()),
            dependencies: parts.dependencies,
            child_template: parts.child_template,
            ports: parts.ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{DelayCounter, Stream, Volume};

    fn volume_template() -> Arc<Recall> {
        TemplateBuilder::channel(
            "mix",
            ChannelId::output(0),
            RecallKind::Volume(Volume::new()),
        )
        .flags(RecallFlags::PERSISTENT)
        .fan_out(RecallKind::Volume(Volume::new()))
        .build(Weak::new())
    }

    #[test]
    fn template_flags_and_state() {
        let template = volume_template();
        assert!(template.is_template());
        assert_eq!(template.state(), Lifecycle::Template);
        assert_eq!(template.level(), RecallLevel::Channel);
        assert!(template.is_persistent());
        assert_eq!(template.kind_name(), "volume");
    }

    #[test]
    fn child_template_shares_same_named_ports() {
        let template = volume_template();
        let child = template.child_template().unwrap();
        assert_eq!(child.level(), RecallLevel::Recycling);
        assert!(child.is_persistent());
        assert!(Arc::ptr_eq(
            template.port("volume").unwrap(),
            child.port("volume").unwrap()
        ));
    }

    #[test]
    fn default_flags_come_from_kind() {
        let delay = TemplateBuilder::audio("delay", RecallKind::DelayCounter(DelayCounter::new()))
            .build(Weak::new());
        assert!(delay.flags().contains(RecallFlags::RUN_FIRST));
        assert!(delay.port("delay").is_some());
    }

    #[test]
    fn instances_share_ports_and_start_pending() {
        let template = volume_template();
        let id = RecallId::new(SoundScope::PLAYBACK, Vec::new());
        let instance = Recall::instantiate(&template, &id, None);
        assert!(!instance.is_template());
        assert_eq!(instance.state(), Lifecycle::Pending);
        assert_eq!(instance.key(), template.key());
        assert_ne!(instance.serial(), template.serial());
        assert!(Arc::ptr_eq(&instance.template().unwrap(), &template));
        assert!(Arc::ptr_eq(&instance.ports()[0], &template.ports()[0]));
    }

    #[test]
    fn children_keep_rank_order_and_links() {
        let template = volume_template();
        let id = RecallId::new(SoundScope::PLAYBACK, Vec::new());
        let parent = Recall::instantiate(&template, &id, None);

        let last = TemplateBuilder::audio("last", RecallKind::Stream(Stream::new(false)))
            .flags(RecallFlags::RUN_LAST)
            .build(Weak::new());
        let first = TemplateBuilder::audio("first", RecallKind::DelayCounter(DelayCounter::new()))
            .build(Weak::new());
        let normal = TemplateBuilder::audio("normal", RecallKind::Stream(Stream::new(false)))
            .build(Weak::new());

        for t in [&last, &normal, &first] {
            parent.add_child(Recall::instantiate(t, &id, None));
        }
        let names: Vec<_> = parent.children().iter().map(|c| c.name().to_owned()).collect();
        assert_eq!(names, ["first", "normal", "last"]);

        let child = parent.children()[1].clone();
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &parent));
        assert!(parent.remove_child(&child));
        assert!(child.parent().is_none());
        assert!(!parent.remove_child(&child));
    }

    #[test]
    fn cancel_propagates_to_ancestors() {
        let template = volume_template();
        let id = RecallId::new(SoundScope::PLAYBACK, Vec::new());
        let root = Recall::instantiate(&template, &id, None);
        let mid = Recall::instantiate(&template, &id, None);
        let leaf = Recall::instantiate(&template, &id, None);
        root.add_child(Arc::clone(&mid));
        mid.add_child(Arc::clone(&leaf));

        leaf.cancel(false);
        assert!(leaf.is_cancel_requested());
        assert!(!mid.is_cancel_requested());

        leaf.cancel(true);
        assert!(mid.is_cancel_requested());
        assert!(root.is_cancel_requested());

        template.cancel(true);
        assert!(!template.is_cancel_requested());
    }
}
