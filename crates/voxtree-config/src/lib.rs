//! Instrument descriptions for the voxtree processing graph.
//!
//! An [`Instrument`] is a TOML document describing an engine: its settings,
//! its channel topology and the recall templates grouped into containers.
//! This crate loads, saves and validates those documents and turns them into
//! a ready [`Engine`](voxtree_core::Engine).
//!
//! # Features
//!
//! - **Instrument files**: load and save descriptions as TOML
//! - **Validation**: kinds, parameters, channel bindings and dependency order
//! - **Building**: expand `line = "*"` bindings and wire dependencies
//! - **Factory instruments**: `sampler`, `drum-machine` and `mixer`
//!
//! # Example
//!
//! ```rust
//! use voxtree_config::get_factory_instrument;
//! use voxtree_core::{SoundScope, VoiceRequest};
//!
//! let instrument = get_factory_instrument("sampler").unwrap();
//! let engine = instrument.build_engine().unwrap();
//! engine.start_voice(VoiceRequest::new(SoundScope::PLAYBACK)).unwrap();
//! let mut out = vec![Vec::new()];
//! engine.render(&mut out);
//! assert_eq!(out[0].len(), instrument.engine.block_size);
//! ```

mod build;
mod error;
mod instrument;
mod kind;

/// Instrument validation.
pub mod validation;

/// Factory instruments bundled with the library.
pub mod factory;

pub use error::ConfigError;
pub use factory::{
    FACTORY_INSTRUMENT_NAMES, factory_instrument_names, factory_instruments,
    get_factory_instrument, is_factory_instrument,
};
pub use instrument::{
    AudioSection, ChannelBinding, ContainerConfig, DependencyConfig, EngineSection, Instrument,
    LineSpec, OrientationConfig, TemplateConfig, TemplateLevel,
};
pub use kind::{KindSpec, build_kind, is_known_kind, parse_param_value};
pub use validation::{ValidationError, ValidationResult, validate_instrument, validate_template};
