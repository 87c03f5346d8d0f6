//! Building an engine from an instrument description.

use std::collections::HashMap;
use std::sync::Arc;

use voxtree_core::{
    Audio, ChannelId, Engine, EngineConfig, Orientation, Recall, RecallContainer, RecallFlags,
    SoundScope, TemplateBuilder,
};

use crate::error::ConfigError;
use crate::instrument::{ContainerConfig, Instrument, TemplateConfig};
use crate::kind::{KindSpec, build_kind};
use crate::validation::{ValidationError, validate_instrument};

impl Instrument {
    /// Build the channel topology described by `[audio]`.
    pub fn build_audio(&self) -> Result<Audio, ConfigError> {
        let a = &self.audio;
        Ok(Audio::new(
            a.audio_channels,
            a.output_pads,
            a.input_pads,
            a.recyclings_per_channel,
        )?)
    }

    /// Build the template containers, expanding `line = "*"` bindings into
    /// one template per line named `"{name}-{line}"`.
    pub fn build_containers(&self) -> Result<Vec<Arc<RecallContainer>>, ConfigError> {
        self.containers
            .iter()
            .map(|c| self.build_container(c))
            .collect()
    }

    /// Validate, then build a ready engine with every container registered.
    pub fn build_engine(&self) -> Result<Engine, ConfigError> {
        validate_instrument(self)?;
        let engine = Engine::new(EngineConfig::from(self.engine), self.build_audio()?)?;
        for container in self.build_containers()? {
            engine.add_container(container);
        }
        tracing::info!(
            "instrument_build: {} ({} containers, {} templates)",
            self.name,
            self.containers.len(),
            self.template_count()
        );
        Ok(engine)
    }

    fn build_container(&self, config: &ContainerConfig) -> Result<Arc<RecallContainer>, ConfigError> {
        let container = RecallContainer::new(config.name.clone());
        let mut named: HashMap<&str, Arc<Recall>> = HashMap::new();

        for template in &config.templates {
            for (name, builder, ports) in self.template_builders(template, &named)? {
                let recall = container.add_template(builder);
                apply_ports(&recall, &ports);
                tracing::debug!(
                    "instrument_template: {}/{} ({})",
                    config.name,
                    name,
                    recall.kind_name()
                );
                if !template.is_expanded() {
                    named.insert(template.name.as_str(), recall);
                }
            }
        }
        Ok(container)
    }

    fn template_builders(
        &self,
        template: &TemplateConfig,
        named: &HashMap<&str, Arc<Recall>>,
    ) -> Result<Vec<(String, TemplateBuilder, TemplatePorts)>, ConfigError> {
        let scope = parse_scope(template)?;
        let flags = parse_flags(template)?;

        let mut dependencies = Vec::with_capacity(template.depends.len());
        for dep in &template.depends {
            let target = named
                .get(dep.target.as_str())
                .ok_or_else(|| ValidationError::UnknownTarget {
                    template: template.name.clone(),
                    target: dep.target.clone(),
                })?;
            dependencies.push((target.key(), dep.outward));
        }

        let instances: Vec<(String, Option<ChannelId>)> = match &template.channel {
            None => vec![(template.name.clone(), None)],
            Some(binding) => {
                let orientation = Orientation::from(binding.orientation);
                let channels = binding.channels(self.audio.lines(orientation));
                if template.is_expanded() {
                    channels
                        .into_iter()
                        .map(|id| (format!("{}-{}", template.name, id.line), Some(id)))
                        .collect()
                } else {
                    channels
                        .into_iter()
                        .map(|id| (template.name.clone(), Some(id)))
                        .collect()
                }
            }
        };

        let mut builders = Vec::with_capacity(instances.len());
        for (name, channel) in instances {
            let KindSpec { kind, ports } = build_kind(&template.name, &template.kind, &template.params)?;
            let mut builder = match channel {
                Some(id) => TemplateBuilder::channel(name.clone(), id, kind),
                None => TemplateBuilder::audio(name.clone(), kind),
            }
            .scope(scope)
            .flags(flags);
            for &(target, outward) in &dependencies {
                builder = builder.depends_on_key(target, outward);
            }
            let mut child_ports = Vec::new();
            if let Some(child) = &template.child {
                let spec = build_kind(&template.name, child, &template.child_params)?;
                builder = builder.fan_out(spec.kind);
                child_ports = spec.ports;
            }
            builders.push((
                name,
                builder,
                TemplatePorts {
                    own: ports,
                    child: child_ports,
                },
            ));
        }
        Ok(builders)
    }
}

fn parse_scope(template: &TemplateConfig) -> Result<SoundScope, ValidationError> {
    if template.scope.is_empty() {
        return Ok(SoundScope::PLAYBACK);
    }
    template.scope.iter().try_fold(SoundScope::NONE, |acc, name| {
        SoundScope::from_name(name)
            .map(|s| acc.union(s))
            .ok_or_else(|| ValidationError::UnknownScope {
                template: template.name.clone(),
                scope: name.clone(),
            })
    })
}

fn parse_flags(template: &TemplateConfig) -> Result<RecallFlags, ValidationError> {
    template.flags.iter().try_fold(RecallFlags::NONE, |acc, name| {
        RecallFlags::from_name(name)
            .map(|f| acc.union(f))
            .ok_or_else(|| ValidationError::UnknownFlag {
                template: template.name.clone(),
                flag: name.clone(),
            })
    })
}

/// Port values from `params` and `child_params`.
struct TemplatePorts {
    own: Vec<(String, f32)>,
    child: Vec<(String, f32)>,
}

fn apply_ports(recall: &Recall, ports: &TemplatePorts) {
    let set = |target: &Recall, values: &[(String, f32)]| {
        for (name, value) in values {
            if let Some(port) = target.port(name) {
                port.set(*value);
            }
        }
    };
    set(recall, &ports.own);
    if let Some(child) = recall.child_template() {
        set(child, &ports.child);
    }
}
