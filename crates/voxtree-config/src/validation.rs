//! Instrument validation.
//!
//! Checks an [`Instrument`] against the rules the engine builder relies on:
//! known kinds and parameters, channel bindings inside the topology, and
//! dependency targets declared earlier in the same container. Every problem
//! is collected, not just the first.
//!
//! # Example
//!
//! ```rust
//! use voxtree_config::{Instrument, TemplateConfig, validate_instrument};
//!
//! let instrument = Instrument::new("Clock").with_container(
//!     "tempo",
//!     vec![TemplateConfig::audio("clock", "delay-counter").with_param("delay", "4")],
//! );
//! validate_instrument(&instrument).expect("clock should validate");
//! ```

use std::collections::HashSet;
use thiserror::Error;

use voxtree_core::{Orientation, RecallFlags, SoundScope};

use crate::instrument::{Instrument, LineSpec, TemplateConfig, TemplateLevel};
use crate::kind::build_kind;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Unknown recall kind.
    #[error("template '{template}': unknown kind '{kind}'")]
    UnknownKind {
        /// Template that names the kind.
        template: String,
        /// The unrecognized kind.
        kind: String,
    },

    /// Parameter that is neither a kind parameter nor a port.
    #[error("template '{template}': unknown parameter '{param}' for kind '{kind}'")]
    UnknownParameter {
        /// Template carrying the parameter.
        template: String,
        /// Kind of the template.
        kind: String,
        /// The unrecognized parameter.
        param: String,
    },

    /// Parameter value that does not parse.
    #[error("template '{template}': invalid value for parameter '{param}': {reason}")]
    InvalidParameter {
        /// Template carrying the parameter.
        template: String,
        /// Name of the parameter.
        param: String,
        /// Description of the format error.
        reason: String,
    },

    /// Dependency on a template not declared earlier in the container.
    #[error("template '{template}': unknown dependency target '{target}'")]
    UnknownTarget {
        /// Template declaring the dependency.
        template: String,
        /// The missing target.
        target: String,
    },

    /// Channel binding missing, misplaced or outside the topology.
    #[error("template '{template}': invalid channel binding: {reason}")]
    InvalidChannel {
        /// Template carrying the binding.
        template: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Unknown sound scope name.
    #[error("template '{template}': unknown scope '{scope}'")]
    UnknownScope {
        /// Template naming the scope.
        template: String,
        /// The unrecognized scope.
        scope: String,
    },

    /// Unknown flag name.
    #[error("template '{template}': unknown flag '{flag}'")]
    UnknownFlag {
        /// Template naming the flag.
        template: String,
        /// The unrecognized flag.
        flag: String,
    },

    /// Two templates with the same name in one container.
    #[error("container '{container}': duplicate template name '{template}'")]
    DuplicateName {
        /// Container holding both templates.
        container: String,
        /// The repeated name.
        template: String,
    },

    /// Topology or engine settings the engine cannot build.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl ValidationError {
    fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }

    /// Flattened list of the individual errors.
    pub fn errors(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Multiple(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

/// Validate a whole instrument, returning every problem found.
pub fn validate_instrument(instrument: &Instrument) -> ValidationResult<()> {
    let mut errors = Vec::new();
    validate_topology(instrument, &mut errors);

    for container in &instrument.containers {
        let mut declared: HashSet<&str> = HashSet::new();
        let mut expanded: HashSet<&str> = HashSet::new();

        for template in &container.templates {
            if !declared.insert(template.name.as_str()) {
                errors.push(ValidationError::DuplicateName {
                    container: container.name.clone(),
                    template: template.name.clone(),
                });
            }
            validate_template(instrument, template, &mut errors);

            for dep in &template.depends {
                let known = declared.contains(dep.target.as_str()) && dep.target != template.name;
                if !known || expanded.contains(dep.target.as_str()) {
                    errors.push(ValidationError::UnknownTarget {
                        template: template.name.clone(),
                        target: dep.target.clone(),
                    });
                }
            }

            if template.is_expanded() {
                expanded.insert(template.name.as_str());
            }
        }
    }

    ValidationError::collect(errors)
}

/// Validate a single template against the topology of `instrument`.
///
/// Dependency targets are not checked here; they need the container's
/// declaration order.
pub fn validate_template(
    instrument: &Instrument,
    template: &TemplateConfig,
    errors: &mut Vec<ValidationError>,
) {
    let name = &template.name;

    if let Err(e) = build_kind(name, &template.kind, &template.params) {
        errors.push(e);
    }
    if let Some(child) = &template.child {
        if let Err(e) = build_kind(name, child, &template.child_params) {
            errors.push(e);
        }
    } else if !template.child_params.is_empty() {
        errors.push(ValidationError::InvalidParameter {
            template: name.clone(),
            param: "child_params".into(),
            reason: "set without a child kind".into(),
        });
    }

    let invalid_channel = |reason: String| ValidationError::InvalidChannel {
        template: name.clone(),
        reason,
    };
    match (template.level, &template.channel) {
        (TemplateLevel::Audio, Some(_)) => {
            errors.push(invalid_channel("audio-level templates take no channel".into()));
        }
        (TemplateLevel::Audio, None) => {
            if template.child.is_some() {
                errors.push(invalid_channel(
                    "fan-out needs a channel-level template".into(),
                ));
            }
        }
        (TemplateLevel::Channel, None) => {
            errors.push(invalid_channel(
                "channel-level templates need a channel".into(),
            ));
        }
        (TemplateLevel::Channel, Some(binding)) => {
            let orientation = Orientation::from(binding.orientation);
            let lines = instrument.audio.lines(orientation);
            match &binding.line {
                LineSpec::Index(line) if *line >= lines => {
                    errors.push(invalid_channel(format!(
                        "{orientation}[{line}] is outside the {lines} {orientation} lines"
                    )));
                }
                LineSpec::Index(_) => {}
                spec if spec.is_all() => {
                    if lines == 0 {
                        errors.push(invalid_channel(format!("no {orientation} lines")));
                    }
                }
                LineSpec::Pattern(other) => {
                    errors.push(invalid_channel(format!(
                        "line must be an index or \"*\", got '{other}'"
                    )));
                }
            }
        }
    }

    for scope in &template.scope {
        if SoundScope::from_name(scope).is_none() {
            errors.push(ValidationError::UnknownScope {
                template: name.clone(),
                scope: scope.clone(),
            });
        }
    }
    for flag in &template.flags {
        if RecallFlags::from_name(flag).is_none() {
            errors.push(ValidationError::UnknownFlag {
                template: name.clone(),
                flag: flag.clone(),
            });
        }
    }
}

fn validate_topology(instrument: &Instrument, errors: &mut Vec<ValidationError>) {
    let audio = &instrument.audio;
    let mut invalid = |what: &str| {
        errors.push(ValidationError::InvalidTopology(format!(
            "{what} must be at least 1"
        )));
    };
    if audio.audio_channels == 0 {
        invalid("audio_channels");
    }
    if audio.output_pads == 0 {
        invalid("output_pads");
    }
    if audio.recyclings_per_channel == 0 {
        invalid("recyclings_per_channel");
    }
    if instrument.engine.block_size == 0 {
        invalid("block_size");
    }
    if instrument.engine.workers == 0 {
        invalid("workers");
    }
}
