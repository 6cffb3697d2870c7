mod common;

use anyhow::Result;
use scumm_engine::opcodes::Op;
use scumm_engine::resource::{HeapLimits, MemoryLoader, ResourceCache, ResourceType};
use scumm_engine::sound::backend::{MixerEvent, RecordingBackend};
use scumm_engine::sound::channel::EndReason;
use scumm_engine::sound::SoundEvent;
use scumm_engine::{EngineConfig, Session, Vm};
use scumm_formats::sound::build;

use common::{pcm, Program};

fn session(config: &EngineConfig, loader: MemoryLoader, backend: RecordingBackend) -> Result<Session> {
    let cache = ResourceCache::new(Box::new(loader), HeapLimits::default());
    let vm = Vm::new(config, Box::new(cache), Box::new(backend))?;
    Ok(Session::new(vm, config.frame_us, 1, Vec::new()))
}

#[test]
fn sound_started_by_a_script_plays_until_the_mixer_drains_it() -> Result<()> {
    let config = EngineConfig {
        version: 60,
        ..EngineConfig::default()
    };
    // Start sound 4, then copy isSoundRunning into var 50 every frame.
    let boot = Program::new(60)
        .push(4)
        .push(0)
        .op(Op::StartSound)
        .push(4)
        .op(Op::IsSoundRunning)
        .write_var(50)
        .op(Op::BreakHere)
        .loop_back(11)
        .code;
    let loader = MemoryLoader::new()
        .with(ResourceType::Script, 1, boot)
        .with(ResourceType::Sound, 4, build::digi(11025, 100, &pcm(4000), &[]));
    let backend = RecordingBackend::new();
    let mut session = session(&config, loader, backend.clone())?;

    session.boot()?;
    session.run(1)?;
    let report = session.report();
    let channel = match report.sound_events.as_slice() {
        [SoundEvent::Started { sound: 4, channel, .. }] => *channel,
        other => panic!("expected sound 4 to start, got {other:?}"),
    };
    assert_eq!(report.channels.len(), 1);
    assert_eq!(report.channels[0].sound, 4);
    assert_eq!(report.globals.get(&50), Some(&1));
    assert!(matches!(
        backend.events().as_slice(),
        [MixerEvent::Start { sound: 4, bytes: 4000, .. }]
    ));

    backend.finish(channel);
    session.run(2)?;
    let report = session.report();
    assert!(report
        .sound_events
        .iter()
        .any(|event| matches!(event, SoundEvent::Ended { sound: 4, .. })));
    assert!(report.channels.is_empty());
    assert_eq!(report.globals.get(&50), None);
    Ok(())
}

#[test]
fn scripts_share_frames_in_cycle_order() -> Result<()> {
    let config = EngineConfig {
        version: 72,
        ..EngineConfig::default()
    };
    // Script 2 counts frames in var 60; script 1 starts it and mirrors the
    // count into var 61 one frame behind.
    let counter = Program::new(72)
        .op(Op::WordVarInc)
        .word(60)
        .op(Op::BreakHere)
        .loop_back(7)
        .code;
    let boot = Program::new(72)
        .push(2)
        .push(0)
        .op(Op::StartScript)
        .byte(0)
        .op(Op::PushWordVar)
        .word(60)
        .write_var(61)
        .op(Op::BreakHere)
        .loop_back(10)
        .code;
    let loader = MemoryLoader::new()
        .with(ResourceType::Script, 1, boot)
        .with(ResourceType::Script, 2, counter);
    let mut session = session(&config, loader, RecordingBackend::new())?;

    session.boot()?;
    session.run(5)?;
    let report = session.report();
    assert_eq!(report.frames, 5);
    assert_eq!(report.scripts.len(), 2);
    assert_eq!(report.globals.get(&60), Some(&6));
    assert_eq!(report.globals.get(&61), Some(&5));
    Ok(())
}

#[test]
fn unsignalled_one_second_sound_times_out_after_the_slack() -> Result<()> {
    let config = EngineConfig {
        version: 60,
        ..EngineConfig::default()
    };
    let boot = Program::new(60)
        .push(7)
        .push(0)
        .op(Op::StartSound)
        .end();
    let loader = MemoryLoader::new()
        .with(ResourceType::Script, 1, boot)
        .with(ResourceType::Sound, 7, build::digi(44100, 0, &pcm(44100), &[]));
    let mut session = session(&config, loader, RecordingBackend::new())?;

    session.boot()?;
    session.run(80)?;
    let report = session.report();
    let started = report.sound_events.iter().find_map(|event| match event {
        SoundEvent::Started { sound: 7, at_us, .. } => Some(*at_us),
        _ => None,
    });
    let ended = report.sound_events.iter().find_map(|event| match event {
        SoundEvent::Ended { sound: 7, at_us, reason, .. } => Some((*at_us, *reason)),
        _ => None,
    });
    let (Some(started), Some((ended, reason))) = (started, ended) else {
        panic!("sound 7 should start and end: {:?}", report.sound_events);
    };
    assert_eq!(reason, EndReason::TimedOut);
    let slack = config.sound.timeout_slack_us;
    let played = ended - started;
    assert!(played >= 1_000_000 + slack, "ended after {played} us");
    assert!(played < 1_000_000 + slack + config.frame_us, "ended after {played} us");
    assert!(report.channels.is_empty());
    Ok(())
}
