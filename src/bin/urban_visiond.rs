//! urban-visiond - urban scene analytics daemon
//!
//! This daemon:
//! 1. Loads configuration (`URBAN_VISION_CONFIG` file + env overrides)
//! 2. Ingests frames from a local raw file or a synthetic `stub://` scene
//! 3. Runs the configured detector backend on every frame
//! 4. Tracks people and analyzes traffic, crowd and parking occupancy
//! 5. Writes one JSON report per frame to stdout or a file

use anyhow::{anyhow, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use urban_vision::config::SCRIPTED_BACKEND;
use urban_vision::{
    BackendRegistry, FileSource, FramePipeline, JsonLinesSink, Orchestrator,
    OrchestratorSettings, ScriptedBackend, StubBackend, VisionConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source: a raw rgb24 file or stub://<name>. Overrides config.
    #[arg(long)]
    source: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Write JSON-lines reports here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Per-frame detection script for the scripted backend.
    #[arg(long, env = "URBAN_VISION_DETECTION_SCRIPT")]
    detection_script: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = VisionConfig::load()?;
    if let Some(source) = args.source {
        cfg.source.path = source;
    }
    if args.max_frames.is_some() {
        cfg.source.max_frames = args.max_frames;
    }
    if let Some(script) = args.detection_script {
        let shown = script.display().to_string();
        if let Some(replaced) = cfg.detection.use_script(script) {
            log::info!(
                "--detection-script {} overrides configured detector backend '{}' with '{}'",
                shown,
                replaced,
                SCRIPTED_BACKEND
            );
        }
    }

    let registry = build_registry(&cfg)?;
    let source = FileSource::new(cfg.source.file_config())?;
    let mut pipeline = FramePipeline::with_capacity(source, cfg.pipeline.buffer_capacity);
    let mut orchestrator = Orchestrator::new(registry, OrchestratorSettings::from(&cfg));

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    log::info!(
        "urban-visiond {} reading {} ({}x{})",
        env!("CARGO_PKG_VERSION"),
        cfg.source.path,
        cfg.source.width,
        cfg.source.height
    );

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
            anyhow!("failed to create output {}: {}", path.display(), e)
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    let mut sink = JsonLinesSink::new(writer);

    let summary = orchestrator.run_until(&mut pipeline, &mut sink, &stop)?;
    log::info!(
        "urban-visiond done: {} frames processed, {} acquired, {} dropped",
        summary.frames_processed,
        summary.pipeline.frames_acquired,
        summary.pipeline.frames_dropped
    );
    Ok(())
}

fn build_registry(cfg: &VisionConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    if let Some(path) = &cfg.detection.script_path {
        registry.register(ScriptedBackend::from_json_file(path)?);
    }
    registry.set_default(&cfg.detection.backend)?;
    Ok(registry)
}
