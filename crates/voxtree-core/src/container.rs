//! Recall containers.
//!
//! A [`RecallContainer`] groups the templates that implement one instrument
//! or effect unit, and keeps a registry of the instances duplicated from them
//! (one per template and recall id). The registry is what makes duplication
//! idempotent and what dependency resolution searches.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::recall::{Recall, RecallKey, RecallLevel, TemplateBuilder};
use crate::recall_id::RecallIdKey;
use crate::recycling::Recycling;
use crate::topology::ChannelId;

/// Templates of one instrument or effect unit, and their live instances.
pub struct RecallContainer {
    name: String,
    templates: RwLock<Vec<Arc<Recall>>>,
    instances: Mutex<Vec<Arc<Recall>>>,
}

impl RecallContainer {
    /// Creates an empty container.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            templates: RwLock::new(Vec::new()),
            instances: Mutex::new(Vec::new()),
        })
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a template owned by this container.
    pub fn add_template(self: &Arc<Self>, builder: TemplateBuilder) -> Arc<Recall> {
        let template = builder.build(Arc::downgrade(self));
        tracing::debug!(
            "container_add_template: {} {} ({}) in {}",
            template.key(),
            template.name(),
            template.kind_name(),
            self.name
        );
        self.templates.write().push(Arc::clone(&template));
        template
    }

    /// All templates, in declaration order.
    pub fn templates(&self) -> Vec<Arc<Recall>> {
        self.templates.read().clone()
    }

    /// Templates at `level`. Recycling-level templates are the fan-out
    /// children of channel or audio templates.
    pub fn templates_at(&self, level: RecallLevel) -> Vec<Arc<Recall>> {
        let templates = self.templates.read();
        match level {
            RecallLevel::Recycling => templates
                .iter()
                .filter_map(|t| t.child_template().cloned())
                .collect(),
            _ => templates
                .iter()
                .filter(|t| t.level() == level)
                .cloned()
                .collect(),
        }
    }

    /// Template by key.
    pub fn template(&self, key: RecallKey) -> Option<Arc<Recall>> {
        self.templates.read().iter().find(|t| t.key() == key).cloned()
    }

    /// Template by name.
    pub fn template_named(&self, name: &str) -> Option<Arc<Recall>> {
        self.templates
            .read()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// The first audio-level template. Its instance is the parent of the
    /// container's channel-level instances for the same voice.
    pub fn head_template(&self) -> Option<Arc<Recall>> {
        self.templates
            .read()
            .iter()
            .find(|t| t.level() == RecallLevel::Audio)
            .cloned()
    }

    /// Templates bound to `channel`.
    pub fn find_by_channel(&self, channel: ChannelId) -> Vec<Arc<Recall>> {
        self.templates
            .read()
            .iter()
            .filter(|t| t.channel() == Some(channel))
            .cloned()
            .collect()
    }

    /// Live instances (including fan-out children) bound to `recycling`.
    pub fn find_by_recycling(&self, recycling: &Recycling) -> Vec<Arc<Recall>> {
        let mut found = Vec::new();
        for instance in self.instances.lock().iter() {
            collect_by_recycling(instance, recycling, &mut found);
        }
        found
    }

    /// The registered instance of `template` for a recall id.
    pub fn find_instance(&self, template: RecallKey, recall_id: RecallIdKey) -> Option<Arc<Recall>> {
        self.instances
            .lock()
            .iter()
            .find(|i| {
                i.key() == template && i.recall_id().is_some_and(|id| id.key() == recall_id)
            })
            .cloned()
    }

    /// Every registered instance.
    pub fn instances(&self) -> Vec<Arc<Recall>> {
        self.instances.lock().clone()
    }

    /// Registers `instance` unless the same (template, recall id) pair is
    /// already present, in which case the existing instance is returned.
    pub(crate) fn register(&self, instance: Arc<Recall>) -> Result<(), Arc<Recall>> {
        let mut instances = self.instances.lock();
        let id = instance.recall_id().map(|id| id.key());
        if let Some(existing) = instances
            .iter()
            .find(|i| i.key() == instance.key() && i.recall_id().map(|id| id.key()) == id)
        {
            return Err(Arc::clone(existing));
        }
        instances.push(instance);
        Ok(())
    }

    /// Drops `instance` from the registry.
    pub(crate) fn forget(&self, instance: &Arc<Recall>) -> bool {
        let mut instances = self.instances.lock();
        let before = instances.len();
        instances.retain(|i| !Arc::ptr_eq(i, instance));
        before != instances.len()
    }
}

impl core::fmt::Debug for RecallContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallContainer")
            .field("name", &self.name)
            .field("templates", &self.templates.read().len())
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

fn collect_by_recycling(recall: &Arc<Recall>, recycling: &Recycling, found: &mut Vec<Arc<Recall>>) {
    if recall.recycling().is_some_and(|r| r.id() == recycling.id()) {
        found.push(Arc::clone(recall));
    }
    for child in recall.children().iter() {
        collect_by_recycling(child, recycling, found);
    }
}
