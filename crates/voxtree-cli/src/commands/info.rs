//! Display the structure of an instrument.

use super::common::load_instrument;
use clap::Args;
use voxtree_core::{Orientation, Recall, RecallContainer, SoundScope};

/// Display instrument information.
#[derive(Args)]
pub struct InfoArgs {
    /// Factory instrument name or instrument file (TOML)
    pub instrument: String,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let instrument = load_instrument(&args.instrument)?;
    let engine = instrument.build_engine()?;

    println!("Instrument:  {}", instrument.name);
    if let Some(desc) = &instrument.description {
        println!("Description: {desc}");
    }
    println!(
        "Engine:      {} Hz, {} frames/tick, {} worker(s)",
        instrument.engine.sample_rate, instrument.engine.block_size, instrument.engine.workers
    );
    engine.with_audio(|audio| {
        println!(
            "Topology:    {} audio channel(s), {} output line(s), {} input line(s), {} recycling(s)/channel",
            audio.audio_channels(),
            audio.lines(Orientation::Output),
            audio.lines(Orientation::Input),
            audio.recyclings_per_channel()
        );
    });

    for container in engine.containers() {
        println!();
        println!("Container {}:", container.name());
        for template in container.templates() {
            print_template(&container, &template);
        }
    }
    Ok(())
}

fn print_template(container: &RecallContainer, template: &Recall) {
    let binding = template
        .channel()
        .map_or_else(|| "audio".to_string(), |c| c.to_string());
    let fan_out = template
        .child_template()
        .map(|c| format!(" -> {}", c.kind_name()))
        .unwrap_or_default();
    println!(
        "  {:12} {:14} {:10}{}",
        template.name(),
        template.kind_name(),
        binding,
        fan_out
    );

    let flags = template.flags().names();
    if !flags.is_empty() {
        println!("      flags: {}", flags.join(", "));
    }
    if template.scope() != SoundScope::PLAYBACK {
        println!("      scope: {}", template.scope());
    }
    for dep in template.dependencies() {
        let target = container
            .template(dep.target)
            .map_or_else(|| dep.target.to_string(), |t| t.name().to_string());
        let outward = if dep.outward { " (outward)" } else { "" };
        println!("      depends on {target}{outward}");
    }
    for port in template.ports() {
        println!("      port {} = {}", port.name(), port.get());
    }
}
