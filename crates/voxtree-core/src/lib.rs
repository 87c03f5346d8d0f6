//! Voxtree Core - dynamic recall/recycling processing graph
//!
//! This crate turns a static description of an instrument (templates grouped
//! in containers, plus a channel topology) into a tree of live, per-voice
//! processing nodes that advance in lock-step, one audio block per tick.
//!
//! # Core Abstractions
//!
//! ## Storage and scoping
//!
//! - [`Audio`] / [`Channel`] - pads of channels, each owning a chain of recyclings
//! - [`Recycling`] - smallest unit of audio storage, holding [`AudioSignal`]s
//! - [`RecyclingContext`] - tree-scoped, ordered view over a span of recyclings
//! - [`RecallId`] - binds one context to one [`SoundScope`] for a voice
//!
//! ## Processing
//!
//! - [`Recall`] - a template or one of its per-voice instances
//! - [`TemplateBuilder`] / [`RecallContainer`] - build and group templates
//! - [`RecallKind`] / [`RecallHandler`] - behavior, one hook per [`Phase`]
//! - [`resolve_batch`] - binds declared dependencies between instances
//! - [`Scheduler`] - runs the phases and prunes finished subtrees
//!
//! ## Facade
//!
//! - [`Engine`] - start/stop voices, tick, render, edit topology, find ports
//!
//! # Example
//!
//! ```rust
//! use voxtree_core::{
//!     Audio, ChannelId, Engine, EngineConfig, Play, RecallContainer, RecallKind,
//!     SoundScope, Stream, TemplateBuilder, VoiceRequest,
//! };
//!
//! let audio = Audio::new(1, 1, 1, 1).unwrap();
//! audio.channel(ChannelId::input(0)).unwrap().recyclings()[0].set_source(vec![0.5; 64]);
//!
//! let container = RecallContainer::new("sampler");
//! container.add_template(
//!     TemplateBuilder::channel("play", ChannelId::input(0), RecallKind::Play(Play))
//!         .fan_out(RecallKind::Stream(Stream::new(false))),
//! );
//!
//! let config = EngineConfig { block_size: 32, ..EngineConfig::default() };
//! let engine = Engine::new(config, audio).unwrap();
//! engine.add_container(container);
//!
//! let voice = engine.start_voice(VoiceRequest::new(SoundScope::PLAYBACK)).unwrap();
//! let mut out = vec![Vec::new()];
//! engine.render(&mut out);
//! assert_eq!(out[0][0], 0.5);
//!
//! engine.stop_voice(&voice);
//! engine.tick();
//! assert!(voice.is_finished());
//! ```
//!
//! # Design Principles
//!
//! - **No global lock**: every context, recall id, recall and recycling locks
//!   itself; only structural edits lock
//! - **Copy-on-write spans**: readers never observe a half-updated span
//! - **Contained failures**: structural misuse is a no-op, hook errors end
//!   only the failing subtree

pub mod container;
pub mod context;
pub mod duplicate;
pub mod engine;
pub mod error;
pub mod flags;
pub mod kinds;
pub mod port;
pub mod recall;
pub mod recall_id;
pub mod recycling;
pub mod resolve;
pub mod scheduler;
pub mod topology;
pub mod voice;

// Re-export main types at crate root
pub use container::RecallContainer;
pub use context::RecyclingContext;
pub use duplicate::Duplicate;
pub use engine::{Engine, EngineConfig, EngineStats, VoiceRequest};
pub use error::{EngineError, RecallError};
pub use flags::{Lifecycle, RecallFlags};
pub use kinds::{
    BeatCounter, DelayCounter, KIND_NAMES, Pattern, Play, RecallKind, Stream, Volume,
};
pub use port::{AutomationPoint, Port, PortSpec};
pub use recall::{
    Dependency, Phase, Recall, RecallHandler, RecallKey, RecallLevel, Resolution, StageContext,
    TemplateBuilder,
};
pub use recall_id::{RecallId, RecallIdKey, SoundScope};
pub use recycling::{AudioSignal, Recycling, RecyclingId};
pub use resolve::{ResolutionReport, UnresolvedDependency, resolve_batch};
pub use scheduler::{Scheduler, TickReport};
pub use topology::{Audio, ChainChange, Channel, ChannelId, Orientation};
pub use voice::{Voice, VoiceBinding, VoiceHandle};
