//! Voice launcher CLI: loads a catalog, brings up the voice pipeline, and
//! launches matched entries.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use voxlaunch::{
    audio, CatalogEntry, LaunchHook, TranscriptEvent, VoiceCoordinator, VoiceSettings, VoiceStatus,
};

#[derive(Debug, Parser)]
#[command(
    name = "voxlaunch",
    version,
    about = "Launch applications by speaking trigger phrases"
)]
struct Cli {
    /// Recognition model directory.
    #[arg(long, env = "VOXLAUNCH_MODEL")]
    model: Option<PathBuf>,

    /// Preferred microphone, matched by display-name substring.
    #[arg(long, env = "VOXLAUNCH_INPUT_DEVICE")]
    input_device: Option<String>,

    /// Catalog file: a JSON list of entries with trigger phrases.
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,

    /// List audio input devices and exit.
    #[arg(long)]
    list_microphones: bool,

    /// Start with voice triggers disabled.
    #[arg(long)]
    no_voice: bool,

    /// Write JSONL trace telemetry.
    #[arg(long)]
    logs: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    voxlaunch::init_tracing(cli.logs);

    if cli.list_microphones {
        let devices = audio::list_microphones();
        if devices.is_empty() {
            println!("no audio input devices found");
        }
        for device in devices {
            println!("{:>3}  {}", device.id, device.display_name);
        }
        return Ok(());
    }

    let model_path = cli
        .model
        .context("--model <DIR> is required unless --list-microphones is given")?;
    let catalog = Arc::new(RwLock::new(load_catalog(&cli.catalog)?));
    let launch: LaunchHook = Arc::new(launch_entry);
    let mut coordinator = VoiceCoordinator::new(Arc::clone(&catalog), launch);
    let events = coordinator.events();

    let settings = VoiceSettings {
        enabled: !cli.no_voice,
        microphone: cli.input_device.clone(),
        model_path,
    };
    coordinator.reconcile(&settings);

    match coordinator.status() {
        VoiceStatus::Listening => println!("listening for trigger phrases (ctrl-c to quit)"),
        VoiceStatus::Disabled => {
            println!("voice triggers disabled");
            return Ok(());
        }
        VoiceStatus::Failed(reason) => {
            println!("voice unavailable: {reason}");
            return Ok(());
        }
    }

    for event in events.iter() {
        match event {
            TranscriptEvent::Partial(text) => println!("  ... {text}"),
            TranscriptEvent::Final(text) => println!("  >>> {text}"),
        }
    }
    coordinator.shutdown();
    Ok(())
}

fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    if !path.exists() {
        info!(path = %path.display(), "catalog file missing; starting with an empty catalog");
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog {}", path.display()))?;
    info!(path = %path.display(), entries = entries.len(), "catalog loaded");
    Ok(entries)
}

/// Launch hook wired into the coordinator; runs on the capture thread, so
/// it only spawns and returns.
fn launch_entry(entry: &CatalogEntry) {
    println!("  launching {}", entry.name);
    let Some(exe) = entry.exe_path.as_ref() else {
        warn!(entry = %entry.name, "matched entry has no executable configured");
        return;
    };
    let mut command = Command::new(exe);
    if let Some(dir) = exe.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    match command.spawn() {
        Ok(child) => info!(entry = %entry.name, pid = child.id(), "launched"),
        Err(err) => warn!(entry = %entry.name, %err, "launch failed"),
    }
}
