//! Engine facade.
//!
//! [`Engine`] ties the pieces together for the three collaborators at the
//! boundary:
//!
//! - the **control layer** starts and stops voices and looks up ports;
//! - the **clock** calls [`tick()`](Engine::tick) or
//!   [`render()`](Engine::render) once per audio block;
//! - the **instrument layer** supplies containers and edits the topology.
//!
//! # Voice start
//!
//! ```text
//! start_voice ─► RecallId + context under parent ─► duplicate (all containers)
//!             ─► resolve batch ─► attach to instance tree ─► queue Admit
//! tick        ─► drain queue ─► init stage ─► run stage ─► prune
//! ```
//!
//! Resolution completes for the whole batch before the voice is queued, so no
//! instance of it runs before its dependencies are bound.
//!
//! # Topology edits
//!
//! After the [`Audio`] changes, every live voice's span is first narrowed
//! bottom-up to the recyclings that survived, then re-derived from its
//! [`VoiceBinding`] top-down, each step swapped in through
//! [`RecyclingContext::replace_span`]. Templates that became reachable are
//! duplicated if the voice never had an instance of them, fan-out children
//! follow their context, and instances whose channel vanished are cancelled.

use std::cmp::Reverse;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::container::RecallContainer;
use crate::context::RecyclingContext;
use crate::duplicate::{Duplicate, fan_out_span, refresh_fan_out};
use crate::error::EngineError;
use crate::flags::{Lifecycle, RecallFlags};
use crate::port::Port;
use crate::recall::{Recall, RecallLevel};
use crate::recall_id::{RecallId, RecallIdKey, SoundScope};
use crate::recycling::is_ordered_subset;
use crate::resolve::{ResolutionReport, resolve_batch};
use crate::scheduler::{Execution, Scheduler, SchedulerCommand, TickReport};
use crate::topology::{Audio, ChainChange, ChannelId, Orientation};
use crate::voice::{Voice, VoiceBinding, VoiceHandle};

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sample rate in Hz, passed through to collaborators.
    pub sample_rate: u32,
    /// Frames per tick.
    pub block_size: usize,
    /// Worker threads for parallel ticks. `1` runs every tick on the caller.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 256,
            workers: 1,
        }
    }
}

/// Parameters of [`Engine::start_voice`].
#[derive(Debug, Clone, Default)]
pub struct VoiceRequest {
    /// Sound scope of the new recall id.
    pub scope: SoundScope,
    /// Restrict the voice to one channel's chain.
    pub channel: Option<ChannelId>,
    /// Nest the voice under another voice instead of the whole-audio context.
    pub parent: Option<VoiceHandle>,
}

impl VoiceRequest {
    /// A whole-audio voice in `scope`.
    pub fn new(scope: SoundScope) -> Self {
        Self {
            scope,
            channel: None,
            parent: None,
        }
    }

    /// Restricts the voice to `channel`.
    pub fn channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Nests the voice under `parent`.
    pub fn under(mut self, parent: &VoiceHandle) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Ticks run so far.
    pub ticks: u64,
    /// Live voices (queued or active).
    pub voices: usize,
    /// Instances across all live voices, fan-out children included.
    pub instances: usize,
    /// Top-level templates across all containers.
    pub templates: usize,
    /// Registered containers.
    pub containers: usize,
    /// Contexts in the tree below (and including) the whole-audio context.
    pub contexts: usize,
}

/// The recall graph engine.
pub struct Engine {
    config: EngineConfig,
    audio: RwLock<Audio>,
    containers: RwLock<Vec<Arc<RecallContainer>>>,
    root: Arc<RecallId>,
    scheduler: Scheduler,
    voices: Mutex<Vec<Weak<Voice>>>,
    pool: Option<ThreadPool>,
}

impl Engine {
    /// Creates an engine over `audio`.
    pub fn new(config: EngineConfig, audio: Audio) -> Result<Self, EngineError> {
        if config.block_size == 0 {
            return Err(EngineError::InvalidTopology(
                "block_size must be at least 1".into(),
            ));
        }
        let pool = if config.workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("voxtree-worker-{i}"))
                .build()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        let root = RecallId::new(SoundScope::ALL, audio.span());
        tracing::debug!(
            "engine_new: {} outputs, {} inputs, block {}",
            audio.lines(Orientation::Output),
            audio.lines(Orientation::Input),
            config.block_size
        );
        Ok(Self {
            config,
            audio: RwLock::new(audio),
            containers: RwLock::new(Vec::new()),
            root,
            scheduler: Scheduler::new(),
            voices: Mutex::new(Vec::new()),
            pool,
        })
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `f` with the topology read-locked.
    pub fn with_audio<R>(&self, f: impl FnOnce(&Audio) -> R) -> R {
        f(&self.audio.read())
    }

    /// The whole-audio context every top-level voice is nested under.
    pub fn root_context(&self) -> Arc<RecyclingContext> {
        self.root.context()
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Registers a container. Voices started afterwards duplicate its
    /// templates.
    pub fn add_container(&self, container: Arc<RecallContainer>) {
        tracing::debug!("engine_add_container: {}", container.name());
        self.containers.write().push(container);
    }

    /// Registered containers.
    pub fn containers(&self) -> Vec<Arc<RecallContainer>> {
        self.containers.read().clone()
    }

    /// Container by name.
    pub fn container(&self, name: &str) -> Option<Arc<RecallContainer>> {
        self.containers
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Starts a voice: allocates its recall id and context, duplicates and
    /// resolves every relevant template, and queues it for the next tick.
    pub fn start_voice(&self, request: VoiceRequest) -> Result<VoiceHandle, EngineError> {
        let audio = self.audio.read();
        let parent_context = match &request.parent {
            Some(parent) if parent.is_finished() => {
                return Err(EngineError::VoiceFinished(parent.key().index()));
            }
            Some(parent) => parent.context(),
            None => self.root.context(),
        };
        let (binding, span) = match (request.channel, &request.parent) {
            (Some(channel), _) => {
                let chain = audio
                    .channel(channel)
                    .ok_or(EngineError::ChannelNotFound(channel))?
                    .recyclings()
                    .to_vec();
                (VoiceBinding::Channel(channel), chain)
            }
            (None, Some(_)) => (VoiceBinding::Inherit, parent_context.recycling().to_vec()),
            (None, None) => (VoiceBinding::Audio, audio.span()),
        };
        let describe = || match request.channel {
            Some(channel) => channel.to_string(),
            None => "voice".to_owned(),
        };
        if !is_ordered_subset(&span, &parent_context.recycling()) {
            return Err(EngineError::SpanOutsideParent(describe()));
        }

        let recall_id = RecallId::new(request.scope, span);
        if !parent_context.add_child(&recall_id.context()) {
            return Err(EngineError::SpanOutsideParent(describe()));
        }
        let voice = Voice::new(recall_id, binding);
        drop(audio);

        let report = self.populate(&voice);
        if !report.is_complete() {
            tracing::debug!(
                "engine_start_voice: {} unresolved dependencies for {}",
                report.unresolved.len(),
                voice.key()
            );
        }
        {
            let mut voices = self.voices.lock();
            voices.retain(|v| v.upgrade().is_some_and(|v| !v.is_finished()));
            voices.push(Arc::downgrade(&voice));
        }
        self.scheduler
            .push(SchedulerCommand::Admit(Arc::clone(&voice)));
        tracing::debug!(
            "engine_start_voice: {} ({:?}, {} roots)",
            voice.key(),
            binding,
            voice.roots().len()
        );
        Ok(voice)
    }

    /// Stops a voice and every voice nested under it. Their instances are
    /// cancelled with propagation and pruned within one tick.
    pub fn stop_voice(&self, voice: &VoiceHandle) {
        voice.cancel(true);
        for other in self.voices() {
            if other.is_nested_in(voice) {
                other.cancel(true);
            }
        }
        tracing::debug!("engine_stop_voice: {}", voice.key());
    }

    /// Advances every voice by one block on the calling thread.
    pub fn tick(&self) -> TickReport {
        self.scheduler
            .tick(self.config.block_size, Execution::Sequential, || {})
    }

    /// Advances every voice by one block, voices in parallel.
    ///
    /// Uses the engine's worker pool when `workers > 1`, rayon's global pool
    /// otherwise.
    pub fn tick_parallel(&self) -> TickReport {
        self.scheduler.tick(
            self.config.block_size,
            Execution::Parallel(self.pool.as_ref()),
            || {},
        )
    }

    /// Ticks and mixes every output line into `outputs[line]`.
    ///
    /// Mixing happens after the last phase and before pruning, so the final
    /// block of a voice that ends this tick is still heard. Each buffer is
    /// resized to the block size; lines beyond the topology stay silent.
    pub fn render(&self, outputs: &mut [Vec<f32>]) -> TickReport {
        let execution = match &self.pool {
            Some(pool) => Execution::Parallel(Some(pool)),
            None => Execution::Sequential,
        };
        let block_size = self.config.block_size;
        self.scheduler.tick(block_size, execution, || {
            let audio = self.audio.read();
            for (line, out) in outputs.iter_mut().enumerate() {
                out.clear();
                out.resize(block_size, 0.0);
                for recycling in audio.routed_recyclings(line) {
                    recycling.mix_into(out);
                }
            }
        })
    }

    /// Resizes one channel's recycling chain and re-derives live voices.
    pub fn resize_recyclings(
        &self,
        channel: ChannelId,
        count: usize,
    ) -> Result<ChainChange, EngineError> {
        let change = self.audio.write().resize_recyclings(channel, count)?;
        self.refresh_topology();
        Ok(change)
    }

    /// Sets the pad count on one side and re-derives live voices.
    pub fn set_pads(&self, orientation: Orientation, pads: usize) -> Result<(), EngineError> {
        self.audio.write().set_pads(orientation, pads)?;
        self.refresh_topology();
        Ok(())
    }

    /// Sets the channels per pad and re-derives live voices.
    pub fn set_audio_channels(&self, audio_channels: usize) -> Result<(), EngineError> {
        self.audio.write().set_audio_channels(audio_channels)?;
        self.refresh_topology();
        Ok(())
    }

    /// Live ports of recalls of kind `kind` with control name `control`.
    /// Hidden recalls are skipped.
    pub fn find_ports(&self, kind: &str, control: &str) -> Vec<Arc<Port>> {
        let mut ports: Vec<Arc<Port>> = Vec::new();
        for template in self.visible_templates() {
            if template.kind_name() != kind {
                continue;
            }
            if let Some(port) = template.port(control)
                && !ports.iter().any(|p| Arc::ptr_eq(p, port))
            {
                ports.push(Arc::clone(port));
            }
        }
        ports
    }

    /// The port of the `kind` recall bound to `channel`.
    pub fn find_port(&self, channel: ChannelId, kind: &str, control: &str) -> Option<Arc<Port>> {
        self.visible_templates()
            .into_iter()
            .filter(|t| t.channel() == Some(channel) && t.kind_name() == kind)
            .find_map(|t| t.port(control).cloned())
    }

    /// Live voices, queued or active, in start order.
    pub fn voices(&self) -> Vec<VoiceHandle> {
        self.voices
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|v| !v.is_finished())
            .collect()
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> EngineStats {
        let voices = self.voices();
        let containers = self.containers.read();
        EngineStats {
            ticks: self.scheduler.ticks(),
            voices: voices.len(),
            instances: voices.iter().map(|v| v.instances().len()).sum(),
            templates: containers.iter().map(|c| c.templates().len()).sum(),
            containers: containers.len(),
            contexts: count_contexts(&self.root.context()),
        }
    }

    /// Duplicates every relevant template for `voice`, resolves the fresh
    /// batch, then attaches it: channel-level instances below the container's
    /// head instance when there is one, everything else as voice roots.
    fn populate(&self, voice: &Voice) -> ResolutionReport {
        let containers = self.containers.read().clone();
        let recall_id = voice.recall_id();

        let mut fresh: Vec<(Arc<RecallContainer>, Arc<Recall>)> = Vec::new();
        for container in &containers {
            for template in container.templates() {
                // a removed instance is never duplicated again for the same id
                if voice.was_duplicated(template.key()) {
                    continue;
                }
                match container.duplicate_with_status(&template, recall_id) {
                    Some(Duplicate::Fresh(instance)) => {
                        voice.mark_duplicated(template.key());
                        fresh.push((Arc::clone(container), instance));
                    }
                    Some(Duplicate::Existing(_)) => {
                        voice.mark_duplicated(template.key());
                    }
                    None => {}
                }
            }
        }
        if fresh.is_empty() {
            return ResolutionReport::default();
        }

        let batch: Vec<_> = fresh.iter().map(|(_, i)| Arc::clone(i)).collect();
        let report = resolve_batch(&containers, &batch);

        let mut roots = Vec::new();
        for (container, instance) in fresh {
            let head = if instance.level() == RecallLevel::Channel {
                container
                    .head_template()
                    .and_then(|h| container.find_instance(h.key(), recall_id.key()))
                    .filter(|h| h.state() < Lifecycle::Done)
            } else {
                None
            };
            match head {
                Some(head) => head.add_child(instance),
                None => roots.push(instance),
            }
        }
        voice.add_roots(roots);
        voice.merge_resolution(report.clone());
        report
    }

    /// Re-derives every voice's span after a topology edit.
    ///
    /// Spans first shrink bottom-up to the recyclings that still exist, so no
    /// child ever holds a recycling its parent has dropped. Only then does
    /// the whole-audio context take the new span, and voices grow top-down
    /// to their bindings.
    fn refresh_topology(&self) {
        let audio = self.audio.read();
        let span = audio.span();
        let mut voices: Vec<_> = self
            .voices()
            .into_iter()
            .map(|v| {
                let before = v.context().recycling();
                (v, before)
            })
            .collect();

        voices.sort_by_key(|(v, _)| Reverse(v.context().depth()));
        let mut lost: Vec<RecallIdKey> = Vec::new();
        for (voice, current) in &voices {
            let context = voice.context();
            let kept: Vec<_> = current
                .iter()
                .filter(|r| span.iter().any(|s| s.id() == r.id()))
                .cloned()
                .collect();
            if kept.len() == current.len() {
                continue;
            }
            if kept.is_empty() || context.replace_span(&kept).is_none() {
                tracing::debug!("engine_refresh: {} lost its span", voice.key());
                voice.cancel(false);
                if let Some(parent) = context.parent() {
                    parent.remove_child(&context);
                }
                lost.push(voice.key());
            }
        }

        if self.root.context().replace_span(&span).is_none() {
            tracing::warn!("engine_refresh: whole-audio context kept its old span");
        }

        voices.sort_by_key(|(v, _)| v.context().depth());
        for (voice, before) in voices.iter().filter(|(v, _)| !lost.contains(&v.key())) {
            let context = voice.context();
            let parent_span = context.parent().map(|p| p.recycling());
            let mut desired = match voice.binding() {
                VoiceBinding::Audio => span.clone(),
                VoiceBinding::Channel(channel) => audio
                    .channel(channel)
                    .map(|c| c.recyclings().to_vec())
                    .unwrap_or_default(),
                VoiceBinding::Inherit => parent_span
                    .as_ref()
                    .map(|s| s.to_vec())
                    .unwrap_or_default(),
            };
            if let Some(parent_span) = &parent_span {
                desired.retain(|r| parent_span.iter().any(|p| p.id() == r.id()));
            }
            if desired.is_empty() || context.replace_span(&desired).is_none() {
                tracing::debug!("engine_refresh: {} lost its span", voice.key());
                voice.cancel(false);
                continue;
            }

            self.populate(voice);
            let voice_span = voice.context().recycling();
            for instance in voice.instances() {
                refresh_fan_out(&instance, before);
                let unreachable = instance.level() == RecallLevel::Channel
                    && fan_out_span(instance.channel(), &voice_span).is_empty();
                if unreachable && !instance.is_cancel_requested() {
                    tracing::debug!(
                        "engine_refresh: {} unreachable for {}",
                        instance.name(),
                        voice.key()
                    );
                    instance.cancel(false);
                }
            }
        }
    }

    fn visible_templates(&self) -> Vec<Arc<Recall>> {
        let mut templates = Vec::new();
        for container in self.containers.read().iter() {
            for template in container.templates() {
                let child = template.child_template().cloned();
                templates.push(template);
                templates.extend(child);
            }
        }
        templates.retain(|t| !t.flags().contains(RecallFlags::HIDDEN));
        templates
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

fn count_contexts(context: &RecyclingContext) -> usize {
    1 + context
        .children()
        .iter()
        .map(|c| count_contexts(c))
        .sum::<usize>()
}
