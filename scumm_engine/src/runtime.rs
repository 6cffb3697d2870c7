use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::{error, info, warn};
use scumm_formats::SpoolFile;

use crate::cli::{ListOpcodesArgs, MixerChoice, RunArgs};
use crate::config::EngineConfig;
use crate::opcodes::OpcodeTable;
use crate::resource::{
    DirectoryLoader, LayeredLoader, MemoryLoader, ResourceCache, ResourceType,
};
use crate::session::{Session, SessionReport};
use crate::sound::backend::{MixerBackend, RecordingBackend};
use crate::sound::software::SoftwareMixer;
use crate::vm::Vm;

pub fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref(), args.he_version)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    let mut overrides = MemoryLoader::new();
    for (id, path) in &args.scripts {
        overrides.insert(ResourceType::Script, *id, read_resource(path)?);
    }
    for (id, path) in &args.sounds {
        overrides.insert(ResourceType::Sound, *id, read_resource(path)?);
    }
    let mut loader = LayeredLoader::new();
    loader.push(Box::new(overrides));
    if let Some(root) = &args.data {
        if !root.is_dir() {
            warn!("data directory {} does not exist", root.display());
        }
        loader.push(Box::new(DirectoryLoader::new(root)));
    }
    let cache = ResourceCache::new(Box::new(loader), config.heap);

    let backend: Box<dyn MixerBackend> = match args.mixer {
        MixerChoice::Software => Box::new(SoftwareMixer::new(
            config.sound.channels,
            config.sound.output_rate,
        )),
        MixerChoice::Recording => Box::new(RecordingBackend::new()),
    };

    let mut vm = Vm::new(&config, Box::new(cache), backend)?;
    if let Some(path) = &args.spool {
        vm.sound_mut().attach_spool(SpoolFile::open(path)?);
    }

    let mut session = Session::new(vm, config.frame_us, args.boot, args.boot_args.clone());
    let outcome = session.boot().and_then(|()| session.run(args.frames));

    let mut report = session.report();
    if let Err(err) = &outcome {
        error!("session aborted after {} frames: {err}", report.frames);
        report.error = Some(err.to_string());
    }
    print_summary(&report);

    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("writing session report to {}", path.display()))?;
        println!("Saved session report to {}", path.display());
    }

    outcome.context("script execution stopped")?;
    Ok(())
}

pub fn list_opcodes(args: ListOpcodesArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.he_version)?;
    let table = OpcodeTable::for_version(config.version)?;
    println!("HE {} opcode table ({} entries)", config.version, table.len());
    for opcode in 0..=u8::MAX {
        if let Some(op) = table.get(opcode) {
            println!("  0x{opcode:02x} {op:?}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>, version: Option<u16>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(version) = version {
        config.version = version;
    }
    info!("interpreting HE {}", config.version);
    Ok(config)
}

fn read_resource(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading resource {}", path.display()))
}

fn print_summary(report: &SessionReport) {
    println!(
        "HE {}: {} frames, {} instructions, {} restarts",
        report.version, report.frames, report.executed, report.restarts
    );
    if let Some(halt) = report.halt {
        println!("  halted: {halt:?}");
    }
    println!(
        "  scripts live: {}, arrays: {}, sounds playing: {}",
        report.scripts.len(),
        report.arrays.len(),
        report.channels.len()
    );
    for request in &report.requests {
        println!("  host request: {request:?}");
    }
    if let Some(error) = &report.error {
        println!("  error: {error}");
    }
}
