//! Factory instruments bundled with the voxtree library.
//!
//! These are always available without external files and double as worked
//! examples of the instrument format.

use crate::Instrument;

/// Array of factory instrument names for external access.
pub static FACTORY_INSTRUMENT_NAMES: &[&str] = &["sampler", "drum-machine", "mixer"];

/// TOML content for factory instruments, embedded at compile time.
static FACTORY_INSTRUMENTS_TOML: &[(&str, &str)] = &[
    ("sampler", SAMPLER),
    ("drum-machine", DRUM_MACHINE),
    ("mixer", MIXER),
];

/// One-shot playback of every input line.
const SAMPLER: &str = r#"
name = "Sampler"
description = "Plays the sample loaded on each input line once per voice"

[engine]
block_size = 256

[audio]
audio_channels = 1
output_pads = 1
input_pads = 4

[[containers]]
name = "sampler"

[[containers.templates]]
name = "play"
kind = "play"
level = "channel"
channel = { orientation = "input", line = "*" }
child = "stream"

[[containers.templates]]
name = "gain"
kind = "volume"
level = "channel"
channel = { orientation = "input", line = "*" }
child = "volume"
params = { volume = "-3dB" }
"#;

/// Three-lane step sequencer.
///
/// 23 blocks of 256 frames at 48 kHz is close to a sixteenth note at 120 BPM.
const DRUM_MACHINE: &str = r#"
name = "Drum Machine"
description = "Kick, snare and hat patterns on input lines 0-2, one bar of sixteenths"

[engine]
block_size = 256

[audio]
audio_channels = 1
output_pads = 1
input_pads = 3

[[containers]]
name = "drums"

[[containers.templates]]
name = "clock"
kind = "delay-counter"
flags = ["persistent"]
params = { delay = "23" }

[[containers.templates]]
name = "beats"
kind = "beat-counter"
depends = [{ target = "clock" }]
params = { length = "16", loop = "1" }

[[containers.templates]]
name = "kick"
kind = "pattern"
level = "channel"
channel = { orientation = "input", line = 0 }
depends = [{ target = "beats" }]
child = "stream"
params = { steps = "x...x...x...x..." }

[[containers.templates]]
name = "snare"
kind = "pattern"
level = "channel"
channel = { orientation = "input", line = 1 }
depends = [{ target = "beats" }]
child = "stream"
params = { steps = "....x.......x..." }

[[containers.templates]]
name = "hat"
kind = "pattern"
level = "channel"
channel = { orientation = "input", line = 2 }
depends = [{ target = "beats" }]
child = "stream"
params = { steps = "x.x.x.x.x.x.x.x." }

[[containers.templates]]
name = "level"
kind = "volume"
level = "channel"
channel = { orientation = "input", line = "*" }
flags = ["persistent"]
child = "volume"
params = { volume = "-6dB" }
"#;

/// Looping stereo mixer with a per-line fader and a hidden trim.
const MIXER: &str = r#"
name = "Mixer"
description = "Loops every input line through a fader and a fixed trim"

[engine]
block_size = 256

[audio]
audio_channels = 2
output_pads = 1
input_pads = 2

[[containers]]
name = "mixer"

[[containers.templates]]
name = "play"
kind = "play"
level = "channel"
channel = { orientation = "input", line = "*" }
child = "stream"
child_params = { looping = "true" }

[[containers.templates]]
name = "fader"
kind = "volume"
level = "channel"
channel = { orientation = "input", line = "*" }
flags = ["persistent"]
child = "volume"
params = { volume = "0dB" }

[[containers.templates]]
name = "trim"
kind = "volume"
level = "channel"
channel = { orientation = "input", line = "*" }
flags = ["persistent", "hidden", "run-last"]
child = "volume"
params = { volume = "-6dB" }
"#;

/// Get all factory instruments.
///
/// ```rust
/// use voxtree_config::factory::factory_instruments;
///
/// for instrument in factory_instruments() {
///     println!("  - {}: {}", instrument.name, instrument.description.as_deref().unwrap_or(""));
/// }
/// ```
pub fn factory_instruments() -> Vec<Instrument> {
    FACTORY_INSTRUMENTS_TOML
        .iter()
        .filter_map(|(_, toml)| Instrument::from_toml(toml).ok())
        .collect()
}

/// Get a factory instrument by identifier or display name, case-insensitive.
///
/// ```rust
/// use voxtree_config::get_factory_instrument;
///
/// let kit = get_factory_instrument("Drum Machine").unwrap();
/// assert_eq!(kit.audio.input_pads, 3);
/// ```
pub fn get_factory_instrument(name: &str) -> Option<Instrument> {
    if let Some((_, toml)) = FACTORY_INSTRUMENTS_TOML
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(name))
    {
        return Instrument::from_toml(toml).ok();
    }
    factory_instruments()
        .into_iter()
        .find(|i| i.name.eq_ignore_ascii_case(name))
}

/// Get the identifiers of all factory instruments.
pub fn factory_instrument_names() -> Vec<&'static str> {
    FACTORY_INSTRUMENTS_TOML.iter().map(|(name, _)| *name).collect()
}

/// Check if a name is a factory instrument identifier or display name.
///
/// ```rust
/// use voxtree_config::is_factory_instrument;
///
/// assert!(is_factory_instrument("mixer"));
/// assert!(is_factory_instrument("Drum Machine"));
/// assert!(!is_factory_instrument("theremin"));
/// ```
pub fn is_factory_instrument(name: &str) -> bool {
    get_factory_instrument(name).is_some()
}
