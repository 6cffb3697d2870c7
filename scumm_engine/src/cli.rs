use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    about = "Headless HE bytecode interpreter: boots a script and reports what it did",
    version
)]
pub struct Args {
    /// JSON engine configuration (defaults apply to missing fields)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HE version to interpret, overriding the config file
    #[arg(long, value_name = "VERSION")]
    pub he_version: Option<u16>,

    /// Directory with scripts/, sounds/, ... holding `<id>.bin` resources
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Script resource taken from a file, as ID=PATH (repeatable)
    #[arg(long = "script", value_name = "ID=PATH", value_parser = parse_resource)]
    pub scripts: Vec<(i32, PathBuf)>,

    /// Sound resource taken from a file, as ID=PATH (repeatable)
    #[arg(long = "sound", value_name = "ID=PATH", value_parser = parse_resource)]
    pub sounds: Vec<(i32, PathBuf)>,

    /// Music spool file to stream songs from
    #[arg(long)]
    pub spool: Option<PathBuf>,

    /// Script to boot
    #[arg(long, default_value_t = 1)]
    pub boot: i32,

    /// Argument passed to the boot script (repeatable)
    #[arg(long = "boot-arg", value_name = "N", allow_hyphen_values = true)]
    pub boot_args: Vec<i32>,

    /// Frames to run after booting
    #[arg(long, default_value_t = 60)]
    pub frames: u64,

    /// Random seed, overriding the config file
    #[arg(long)]
    pub seed: Option<u64>,

    /// Audio backend
    #[arg(long, value_enum, default_value_t = MixerChoice::Software)]
    pub mixer: MixerChoice,

    /// Path to write the session report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Print the opcode table for the selected version and exit
    #[arg(long)]
    pub list_opcodes: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerChoice {
    /// Mix to an in-memory stereo buffer
    Software,
    /// Log mixer calls only; streams never finish on their own
    Recording,
}

#[derive(Debug)]
pub enum Command {
    Run(RunArgs),
    ListOpcodes(ListOpcodesArgs),
}

#[derive(Debug)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub he_version: Option<u16>,
    pub data: Option<PathBuf>,
    pub scripts: Vec<(i32, PathBuf)>,
    pub sounds: Vec<(i32, PathBuf)>,
    pub spool: Option<PathBuf>,
    pub boot: i32,
    pub boot_args: Vec<i32>,
    pub frames: u64,
    pub seed: Option<u64>,
    pub mixer: MixerChoice,
    pub report_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ListOpcodesArgs {
    pub config: Option<PathBuf>,
    pub he_version: Option<u16>,
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    args.into_command()
}

fn parse_resource(raw: &str) -> Result<(i32, PathBuf), String> {
    let (id, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got '{raw}'"))?;
    let id = id
        .trim()
        .parse::<i32>()
        .map_err(|err| format!("bad resource id '{id}': {err}"))?;
    if path.is_empty() {
        return Err(format!("missing path for resource {id}"));
    }
    Ok((id, PathBuf::from(path)))
}

impl Args {
    fn into_command(self) -> Result<Command> {
        if self.list_opcodes {
            if !self.scripts.is_empty() || !self.sounds.is_empty() || self.report_json.is_some() {
                bail!("--list-opcodes does not run scripts");
            }
            return Ok(Command::ListOpcodes(ListOpcodesArgs {
                config: self.config,
                he_version: self.he_version,
            }));
        }

        if self.data.is_none() && self.scripts.is_empty() {
            bail!("nothing to run: pass --data or at least one --script");
        }
        if self.boot_args.len() > 25 {
            bail!("at most 25 boot arguments, got {}", self.boot_args.len());
        }

        Ok(Command::Run(RunArgs {
            config: self.config,
            he_version: self.he_version,
            data: self.data,
            scripts: self.scripts,
            sounds: self.sounds,
            spool: self.spool,
            boot: self.boot,
            boot_args: self.boot_args,
            frames: self.frames,
            seed: self.seed,
            mixer: self.mixer,
            report_json: self.report_json,
        }))
    }
}
