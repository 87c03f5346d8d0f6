//! Integration tests for the voxtree engine.
//!
//! These drive whole voices through the public facade: duplication,
//! dependency resolution, the phase scheduler, pruning and topology edits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use voxtree_core::{
    Audio, BeatCounter, ChannelId, DelayCounter, Engine, EngineConfig, EngineError, Lifecycle,
    Orientation, Pattern, Play, RecallContainer, RecallError, RecallFlags, RecallHandler,
    RecallKind, SoundScope, StageContext, Stream, TemplateBuilder, VoiceRequest, Volume,
};

/// Counts `run_inter` calls and optionally fails on one tick.
#[derive(Clone)]
struct CountingHook {
    calls: Arc<AtomicUsize>,
    fail_on_tick: Option<u64>,
}

impl CountingHook {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = Self {
            calls: Arc::clone(&calls),
            fail_on_tick: None,
        };
        (hook, calls)
    }

    fn failing_on(tick: u64) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on_tick: Some(tick),
        }
    }

    fn kind(self) -> RecallKind {
        RecallKind::Custom(Box::new(self))
    }
}

impl RecallHandler for CountingHook {
    fn kind_name(&self) -> &'static str {
        "counting-hook"
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(self.clone())
    }

    fn run_inter(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if Some(cx.tick()) == self.fail_on_tick {
            return Err(RecallError::new("hook failure"));
        }
        Ok(())
    }
}

fn engine(audio: Audio, block_size: usize) -> Engine {
    let config = EngineConfig {
        block_size,
        ..EngineConfig::default()
    };
    Engine::new(config, audio).unwrap()
}

fn sampler(lines: usize) -> Arc<RecallContainer> {
    let container = RecallContainer::new("sampler");
    for line in 0..lines {
        container.add_template(
            TemplateBuilder::channel(
                format!("play-{line}"),
                ChannelId::input(line),
                RecallKind::Play(Play),
            )
            .fan_out(RecallKind::Stream(Stream::new(false))),
        );
    }
    container
}

fn persistent_volume(name: &str, channel: ChannelId) -> TemplateBuilder {
    TemplateBuilder::channel(name, channel, RecallKind::Volume(Volume::new()))
        .flags(RecallFlags::PERSISTENT)
        .fan_out(RecallKind::Volume(Volume::new()))
}

// ============================================================================
// 1. Dependency resolution across voices
// ============================================================================

#[test]
fn dependencies_bind_within_the_same_voice() {
    let engine = engine(Audio::new(2, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    let clock = container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    container.add_template(
        TemplateBuilder::channel(
            "beats",
            ChannelId::output(1),
            RecallKind::BeatCounter(BeatCounter::new()),
        )
        .depends_on(&clock),
    );
    engine.add_container(container);

    let a = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let b = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();

    let clock_a = a.find("clock").unwrap();
    let clock_b = b.find("clock").unwrap();
    let beats_a = a.find("beats").unwrap();
    let bound = beats_a.dependency(0).unwrap();
    assert!(Arc::ptr_eq(&bound, &clock_a));
    assert!(!Arc::ptr_eq(&bound, &clock_b));
    assert!(a.resolution().is_complete());

    // the channel-level instance hangs below the container's head instance
    assert_eq!(a.roots().len(), 1);
    assert!(Arc::ptr_eq(&a.roots()[0], &clock_a));
    assert!(Arc::ptr_eq(&beats_a.parent().unwrap(), &clock_a));
}

#[test]
fn unresolved_dependency_leaves_consumer_inert() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("mixed");
    let clock = container.add_template(
        TemplateBuilder::audio("clock", RecallKind::DelayCounter(DelayCounter::new()))
            .scope(SoundScope::NOTATION),
    );
    let (hook, calls) = CountingHook::new();
    container.add_template(TemplateBuilder::audio("listener", hook.kind()).depends_on(&clock));
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    assert!(voice.find("clock").is_none());
    let report = voice.resolution();
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].recall, "listener");

    engine.tick();
    assert!(voice.find("listener").unwrap().is_inert());
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert!(!voice.is_finished());
}

#[test]
fn outward_dependency_reaches_parent_voice() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("sequencer");
    let clock = container.add_template(
        TemplateBuilder::audio("clock", RecallKind::DelayCounter(DelayCounter::new()))
            .scope(SoundScope::SEQUENCER),
    );
    container.add_template(
        TemplateBuilder::audio("follower", RecallKind::BeatCounter(BeatCounter::new()))
            .depends_on_outward(&clock),
    );
    container.add_template(
        TemplateBuilder::audio("strict", RecallKind::BeatCounter(BeatCounter::new()))
            .depends_on(&clock),
    );
    engine.add_container(container);

    let parent = engine
        .start_voice(VoiceRequest::new(SoundScope::SEQUENCER))
        .unwrap();
    let child = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).under(&parent))
        .unwrap();
    assert!(child.is_nested_in(&parent));

    let follower = child.find("follower").unwrap();
    assert!(Arc::ptr_eq(
        &follower.dependency(0).unwrap(),
        &parent.find("clock").unwrap()
    ));
    assert!(child.find("strict").unwrap().is_inert());
    assert_eq!(child.resolution().unresolved.len(), 1);
}

// ============================================================================
// 2. Lifecycle, cancellation and failures
// ============================================================================

#[test]
fn instances_run_after_first_tick() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let clock = voice.find("clock").unwrap();
    assert_eq!(clock.state(), Lifecycle::Pending);
    assert_eq!(engine.scheduler().pending_commands(), 1);

    let report = engine.tick();
    assert_eq!(report.admitted, 1);
    assert_eq!(report.active_voices, 1);
    assert_eq!(clock.state(), Lifecycle::Running);
    assert!(!clock.is_template());
}

#[test]
fn stop_voice_prunes_only_that_voice() {
    let engine = engine(Audio::new(2, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    let clock = container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    container.add_template(
        TemplateBuilder::channel(
            "beats",
            ChannelId::output(1),
            RecallKind::BeatCounter(BeatCounter::new()),
        )
        .depends_on(&clock),
    );
    engine.add_container(container);

    let a = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let b = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    engine.tick();

    let clock_a = a.find("clock").unwrap();
    let beats_a = a.find("beats").unwrap();
    engine.stop_voice(&a);
    let report = engine.tick();
    assert_eq!(report.removed, 2);
    assert_eq!(report.finished_voices, 1);
    assert_eq!(clock_a.state(), Lifecycle::Removed);
    assert_eq!(beats_a.state(), Lifecycle::Removed);
    assert!(a.is_finished());

    assert!(!b.is_finished());
    assert_eq!(b.find("clock").unwrap().state(), Lifecycle::Running);
    assert_eq!(engine.voices().len(), 1);
}

#[test]
fn leaf_cancel_propagates_to_ancestors() {
    let engine = engine(Audio::new(2, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    let clock = container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    container.add_template(
        TemplateBuilder::channel(
            "beats",
            ChannelId::output(1),
            RecallKind::BeatCounter(BeatCounter::new()),
        )
        .depends_on(&clock),
    );
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    engine.tick();

    let beats = voice.find("beats").unwrap();
    beats.cancel(true);
    assert!(voice.find("clock").unwrap().is_cancel_requested());

    engine.tick();
    assert_eq!(beats.state(), Lifecycle::Removed);
    assert!(voice.is_finished());
}

#[test]
fn stop_before_admission_finishes_on_first_tick() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    engine.stop_voice(&voice);
    let report = engine.tick();
    assert_eq!(report.admitted, 1);
    assert_eq!(report.finished_voices, 1);
    assert_eq!(report.active_voices, 0);
}

#[test]
fn failing_hook_removes_only_its_subtree() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("hooks");
    let (healthy, healthy_calls) = CountingHook::new();
    container.add_template(TemplateBuilder::audio("healthy", healthy.kind()));
    container.add_template(TemplateBuilder::audio("broken", CountingHook::failing_on(1).kind()));
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    assert_eq!(engine.tick().failures, 0);

    let report = engine.tick();
    assert_eq!(report.failures, 1);
    assert_eq!(report.removed, 1);
    assert!(voice.find("broken").is_none());
    assert!(!voice.is_finished());

    engine.tick();
    assert_eq!(healthy_calls.load(Ordering::Relaxed), 3);
    assert_eq!(
        voice.find("healthy").unwrap().state(),
        Lifecycle::Running
    );
}

// ============================================================================
// 3. Rendering
// ============================================================================

#[test]
fn sampler_plays_source_then_finishes() {
    let audio = Audio::new(1, 1, 1, 1).unwrap();
    audio.channel(ChannelId::input(0)).unwrap().recyclings()[0].set_source(vec![0.25; 40]);
    let engine = engine(audio, 16);
    engine.add_container(sampler(1));

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let mut out = vec![Vec::new()];

    for _ in 0..2 {
        let report = engine.render(&mut out);
        assert_eq!(report.finished_voices, 0);
        assert!(out[0].iter().all(|&s| s == 0.25));
    }

    let report = engine.render(&mut out);
    assert_eq!(report.tick, 2);
    assert_eq!(report.finished_voices, 1);
    assert!(out[0][..8].iter().all(|&s| s == 0.25));
    assert!(out[0][8..].iter().all(|&s| s == 0.0));
    assert!(voice.is_finished());

    let report = engine.render(&mut out);
    assert_eq!(report.active_voices, 0);
    assert!(out[0].iter().all(|&s| s == 0.0));
}

#[test]
fn volume_scales_and_follows_automation() {
    let audio = Audio::new(1, 1, 1, 1).unwrap();
    audio.channel(ChannelId::input(0)).unwrap().recyclings()[0].set_source(vec![0.5; 64]);
    let engine = engine(audio, 16);
    engine.add_container(sampler(1));
    let mixer = RecallContainer::new("mixer");
    mixer.add_template(
        TemplateBuilder::channel("gain", ChannelId::input(0), RecallKind::Volume(Volume::new()))
            .fan_out(RecallKind::Volume(Volume::new())),
    );
    engine.add_container(mixer);

    let port = engine
        .find_port(ChannelId::input(0), "volume", "volume")
        .unwrap();
    port.set(0.5);
    port.schedule(1, 0.0);

    engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let mut out = vec![Vec::new()];
    engine.render(&mut out);
    assert!(out[0].iter().all(|&s| s == 0.25));

    engine.render(&mut out);
    assert!(out[0].iter().all(|&s| s == 0.0));
    assert_eq!(port.pending_automation(), 0);
}

#[test]
fn drum_pattern_triggers_on_set_steps() {
    let audio = Audio::new(1, 1, 1, 1).unwrap();
    audio.channel(ChannelId::input(0)).unwrap().recyclings()[0].set_source(vec![1.0; 4]);
    let engine = engine(audio, 4);
    let kit = RecallContainer::new("kit");
    let clock = kit.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    let beats = kit.add_template(
        TemplateBuilder::audio("beats", RecallKind::BeatCounter(BeatCounter::new()))
            .depends_on(&clock),
    );
    kit.add_template(
        TemplateBuilder::channel(
            "pattern",
            ChannelId::input(0),
            RecallKind::Pattern(Pattern::parse("x.x.")),
        )
        .depends_on(&beats)
        .fan_out(RecallKind::Stream(Stream::new(false))),
    );
    engine.add_container(kit);

    let delay = engine.find_ports("delay-counter", "delay");
    assert_eq!(delay.len(), 1);
    delay[0].set(2.0);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let mut out = vec![Vec::new()];
    let mut heard = Vec::new();
    for _ in 0..6 {
        engine.render(&mut out);
        heard.push(out[0].iter().all(|&s| s == 1.0));
    }
    // beats land every second tick, hits on steps 0 and 2
    assert_eq!(heard, [true, false, false, false, true, false]);

    let pattern = voice.find("pattern").unwrap();
    assert_eq!(pattern.children().len(), 1);
    assert!(pattern.is_persistent());
    assert!(!voice.is_finished());
}

#[test]
fn parallel_tick_runs_independent_voices() {
    let audio = Audio::new(1, 1, 4, 1).unwrap();
    for line in 0..4 {
        audio.channel(ChannelId::input(line)).unwrap().recyclings()[0].set_source(vec![0.1; 16]);
    }
    let config = EngineConfig {
        block_size: 16,
        workers: 2,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, audio).unwrap();
    engine.add_container(sampler(4));

    let voices: Vec<_> = (0..4)
        .map(|line| {
            engine
                .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).channel(ChannelId::input(line)))
                .unwrap()
        })
        .collect();
    for voice in &voices {
        assert_eq!(voice.roots().len(), 1);
    }

    let report = engine.tick_parallel();
    assert_eq!(report.admitted, 4);
    assert_eq!(report.failures, 0);
    assert_eq!(report.finished_voices, 4);
    assert!(voices.iter().all(|v| v.is_finished()));
}

// ============================================================================
// 4. Topology edits
// ============================================================================

#[test]
fn resize_replaces_context_and_fans_out() {
    let engine = engine(Audio::new(1, 1, 0, 2).unwrap(), 8);
    let mixer = RecallContainer::new("mixer");
    mixer.add_template(persistent_volume("gain", ChannelId::output(0)));
    engine.add_container(mixer);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).channel(ChannelId::output(0)))
        .unwrap();
    engine.tick();
    let old_context = voice.context();
    let held = engine.root_context().children();
    assert_eq!(old_context.len(), 2);
    assert_eq!(voice.find("gain").unwrap().children().len(), 2);

    let change = engine.resize_recyclings(ChannelId::output(0), 4).unwrap();
    assert_eq!(change.old.len(), 2);
    assert_eq!(change.new.len(), 4);

    // readers holding the old context keep a consistent view
    assert_eq!(old_context.len(), 2);
    assert!(Arc::ptr_eq(&held[0], &old_context));

    let new_context = voice.context();
    assert_eq!(new_context.len(), 4);
    assert!(!Arc::ptr_eq(&new_context, &old_context));
    assert!(Arc::ptr_eq(&engine.root_context().children()[0], &new_context));

    let gain = voice.find("gain").unwrap();
    assert_eq!(gain.children().len(), 4);
    engine.tick();
    assert!(gain.children().iter().all(|c| c.state() == Lifecycle::Running));
}

#[test]
fn removing_a_channel_cancels_its_instances() {
    let engine = engine(Audio::new(1, 1, 2, 1).unwrap(), 8);
    let mixer = RecallContainer::new("mixer");
    mixer.add_template(persistent_volume("gain-0", ChannelId::input(0)));
    mixer.add_template(persistent_volume("gain-1", ChannelId::input(1)));
    engine.add_container(mixer);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    engine.tick();
    assert_eq!(voice.roots().len(), 2);
    let doomed = voice.find("gain-1").unwrap();

    engine.set_pads(Orientation::Input, 1).unwrap();
    assert!(doomed.is_cancel_requested());
    engine.tick();

    assert_eq!(doomed.state(), Lifecycle::Removed);
    assert!(voice.find("gain-1").is_none());
    assert!(voice.find("gain-0").is_some());
    assert!(!voice.is_finished());
    assert_eq!(voice.context().len(), 2);
}

#[test]
fn topology_edit_does_not_revive_finished_instances() {
    let audio = Audio::new(1, 1, 1, 1).unwrap();
    audio.channel(ChannelId::input(0)).unwrap().recyclings()[0].set_source(vec![0.25; 40]);
    let engine = engine(audio, 16);
    let container = sampler(1);
    container.add_template(persistent_volume("gain", ChannelId::output(0)));
    engine.add_container(container);

    let voice = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let play = voice.find("play-0").unwrap();
    let mut out = vec![Vec::new()];
    for _ in 0..4 {
        engine.render(&mut out);
    }
    assert_eq!(play.state(), Lifecycle::Removed);
    assert!(voice.find("play-0").is_none());
    assert!(!voice.is_finished());

    engine.resize_recyclings(ChannelId::output(0), 2).unwrap();
    assert!(voice.find("play-0").is_none());
    assert!(voice.was_duplicated(play.key()));
    assert_eq!(voice.find("gain").unwrap().children().len(), 2);

    engine.render(&mut out);
    assert!(out[0].iter().all(|&s| s == 0.0));
    assert!(voice.find("play-0").is_none());
}

#[test]
fn shrinking_topology_keeps_nested_spans_inside_parents() {
    let engine = engine(Audio::new(2, 2, 0, 2).unwrap(), 8);
    let mixer = RecallContainer::new("mixer");
    for line in 0..4 {
        mixer.add_template(persistent_volume(&format!("gain-{line}"), ChannelId::output(line)));
    }
    engine.add_container(mixer);

    let whole = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    let kept = engine
        .start_voice(
            VoiceRequest::new(SoundScope::PLAYBACK)
                .channel(ChannelId::output(0))
                .under(&whole),
        )
        .unwrap();
    let doomed = engine
        .start_voice(
            VoiceRequest::new(SoundScope::PLAYBACK)
                .channel(ChannelId::output(3))
                .under(&whole),
        )
        .unwrap();
    engine.tick();

    engine.set_pads(Orientation::Output, 1).unwrap();

    // before any tick: every child is still inside its parent
    let whole_span = whole.context().recycling();
    assert_eq!(whole_span.len(), 4);
    for child in whole.context().children().iter() {
        let span = child.recycling();
        assert!(span.iter().all(|r| whole_span.iter().any(|w| w.id() == r.id())));
    }
    assert!(doomed.context().parent().is_none());
    assert_eq!(kept.context().len(), 2);
    assert_eq!(engine.root_context().len(), 4);

    engine.tick();
    assert!(doomed.is_finished());
    assert!(!kept.is_finished());
}

#[test]
fn readers_see_consistent_spans_while_resizing_mid_tick() {
    let engine = engine(Audio::new(1, 2, 0, 4).unwrap(), 8);
    let mixer = RecallContainer::new("mixer");
    mixer.add_template(persistent_volume("gain-0", ChannelId::output(0)));
    mixer.add_template(persistent_volume("gain-1", ChannelId::output(1)));
    engine.add_container(mixer);
    for line in 0..2 {
        engine
            .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).channel(ChannelId::output(line)))
            .unwrap();
    }
    engine.tick();

    let done = std::sync::atomic::AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..40 {
                let len = if i % 2 == 0 { 2 } else { 6 };
                engine.resize_recyclings(ChannelId::output(0), len).unwrap();
                engine.tick_parallel();
            }
            done.store(true, Ordering::Release);
        });
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                engine.tick_parallel();
            }
        });
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                let root = engine.root_context();
                assert!(matches!(root.len(), 6 | 8 | 10));
                for child in root.children().iter() {
                    let span = child.recycling();
                    assert!(matches!(span.len(), 2 | 4 | 6));
                    assert!(span.iter().all(|r| r.channel() == span[0].channel()));
                }
            }
        });
    });

    let voices = engine.voices();
    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].context().len(), 6);
    assert_eq!(voices[0].find("gain-0").unwrap().children().len(), 6);
    assert_eq!(voices[1].context().len(), 4);
}

// ============================================================================
// 5. Facade
// ============================================================================

#[test]
fn start_voice_rejects_bad_requests() {
    let engine = engine(Audio::new(1, 1, 1, 1).unwrap(), 8);
    let missing = engine.start_voice(VoiceRequest::new(SoundScope::PLAYBACK).channel(ChannelId::output(9)));
    assert!(matches!(missing, Err(EngineError::ChannelNotFound(_))));

    let parent = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).channel(ChannelId::output(0)))
        .unwrap();
    let outside = engine.start_voice(
        VoiceRequest::new(SoundScope::PLAYBACK)
            .channel(ChannelId::input(0))
            .under(&parent),
    );
    assert!(matches!(outside, Err(EngineError::SpanOutsideParent(_))));

    // no roots: the voice finishes on its first tick
    engine.tick();
    assert!(parent.is_finished());
    let late = engine.start_voice(VoiceRequest::new(SoundScope::PLAYBACK).under(&parent));
    assert!(matches!(late, Err(EngineError::VoiceFinished(_))));

    let zero = Engine::new(
        EngineConfig {
            block_size: 0,
            ..EngineConfig::default()
        },
        Audio::new(1, 1, 0, 1).unwrap(),
    );
    assert!(zero.is_err());
}

#[test]
fn port_lookup_skips_hidden_templates() {
    let engine = engine(Audio::new(2, 1, 0, 1).unwrap(), 8);
    let mixer = RecallContainer::new("mixer");
    mixer.add_template(
        TemplateBuilder::channel("bus", ChannelId::output(0), RecallKind::Volume(Volume::new()))
            .flags(RecallFlags::HIDDEN),
    );
    mixer.add_template(TemplateBuilder::channel(
        "fader",
        ChannelId::output(1),
        RecallKind::Volume(Volume::new()),
    ));
    engine.add_container(mixer);

    assert_eq!(engine.find_ports("volume", "volume").len(), 1);
    assert!(engine.find_port(ChannelId::output(1), "volume", "volume").is_some());
    assert!(engine.find_port(ChannelId::output(0), "volume", "volume").is_none());
    assert!(engine.find_ports("volume", "pan").is_empty());
}

#[test]
fn stats_count_live_structure() {
    let engine = engine(Audio::new(1, 1, 0, 1).unwrap(), 8);
    let container = RecallContainer::new("tempo");
    container.add_template(TemplateBuilder::audio(
        "clock",
        RecallKind::DelayCounter(DelayCounter::new()),
    ));
    engine.add_container(container);

    let parent = engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK))
        .unwrap();
    engine
        .start_voice(VoiceRequest::new(SoundScope::PLAYBACK).under(&parent))
        .unwrap();
    engine.tick();

    let stats = engine.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.voices, 2);
    assert_eq!(stats.instances, 2);
    assert_eq!(stats.templates, 1);
    assert_eq!(stats.containers, 1);
    assert_eq!(stats.contexts, 3);

    engine.stop_voice(&parent);
    engine.tick();
    let stats = engine.stats();
    assert_eq!(stats.voices, 0);
    assert_eq!(stats.contexts, 1);
}
