use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use memmap2::MmapOptions;
use scumm_formats::chunk::peek_tag;
use scumm_formats::{FourCc, SoundHeader, SpoolIndex, parse_sound};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Inspect HE sound resources and spooled music files", version)]
struct Args {
    /// Sound resources, spool files, or directories to scan recursively
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Emit one JSON document per file instead of the text summary
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Report {
    Sound { path: String, header: SoundHeader },
    Spool { path: String, index: SpoolIndex },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let files = collect_files(&args.paths)?;
    if files.is_empty() {
        bail!("no files to inspect");
    }

    for path in files {
        match inspect(&path) {
            Ok(report) if args.json => println!("{}", serde_json::to_string(&report)?),
            Ok(report) => print_report(&report),
            Err(err) => eprintln!("{}: {err:#}", path.display()),
        }
    }
    Ok(())
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|res| res.ok()) {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    files.sort();
    Ok(files)
}

fn inspect(path: &Path) -> Result<Report> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("memory-mapping {}", path.display()))?;
    let display = path.display().to_string();

    if peek_tag(&mmap)? == FourCc::new(b"SONG") {
        let index = SpoolIndex::parse(&mmap)?;
        index.validate_against(mmap.len() as u64)?;
        return Ok(Report::Spool {
            path: display,
            index,
        });
    }

    let header = parse_sound(&mmap)?;
    Ok(Report::Sound {
        path: display,
        header,
    })
}

fn print_report(report: &Report) {
    match report {
        Report::Sound { path, header } => {
            println!(
                "{path}: {kind:?} {rate} Hz {bits}-bit x{channels}, {samples} samples at {offset}",
                kind = header.kind,
                rate = header.frequency,
                bits = header.bits_per_sample,
                channels = header.channels,
                samples = header.sample_count,
                offset = header.data.offset,
            );
            if let Some(priority) = header.priority {
                println!("  priority override {priority}");
            }
            for event in &header.code {
                println!("  @{:>8} {} ops", event.timestamp, event.ops.len());
            }
        }
        Report::Spool { path, index } => {
            println!("{path}: {} songs", index.entries().len());
            for entry in index.entries() {
                println!(
                    "  song {id:<6} {offset:>10} {length:>10}",
                    id = entry.id,
                    offset = entry.offset,
                    length = entry.length
                );
            }
        }
    }
}
