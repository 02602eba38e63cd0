//! demo - end-to-end synthetic run of the urban analytics pipeline
//!
//! A `stub://` source produces frames while a scripted detector replays a
//! small street scene: pedestrians crossing, a group waiting at a corner and
//! cars pulling into a parking row.

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use urban_vision::{
    BBox, BackendRegistry, CrowdMethod, Detection, FileConfig, FileSource, FramePipeline,
    MemorySink, Orchestrator, OrchestratorSettings, ScriptedBackend,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 60)]
    frames: u64,
    /// Crowd method (counting|clustering|density_map).
    #[arg(long, default_value = "clustering")]
    crowd: CrowdMethod,
    /// Seed for pedestrian jitter.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    stage("script street scene");
    let script = street_scene(args.frames, args.seed);
    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::new(script));

    stage("open synthetic source");
    let source = FileSource::new(FileConfig {
        path: "stub://demo_street".to_string(),
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        target_fps: 0,
        max_frames: Some(args.frames),
    })?;
    // Keep every frame so the summary covers the whole script.
    let mut pipeline = FramePipeline::with_capacity(source, args.frames as usize + 1);

    let settings = OrchestratorSettings {
        crowd_method: args.crowd,
        spot_grid: (8, 1),
        ..OrchestratorSettings::default()
    };
    let mut orchestrator = Orchestrator::new(registry, settings);
    let mut sink = MemorySink::default();

    stage("run analytics");
    let summary = orchestrator.run(&mut pipeline, &mut sink)?;
    println!(
        "frames: processed={} acquired={} dropped={}",
        summary.frames_processed, summary.pipeline.frames_acquired, summary.pipeline.frames_dropped
    );

    let Some(last) = sink.reports.last() else {
        return Err(anyhow!("no frames were processed"));
    };

    stage("traffic");
    println!(
        "  cumulative counts: {:?}",
        orchestrator.traffic().vehicle_count()
    );
    println!(
        "  last frame: {} vehicles, density {:.2}% ({:?}), avg speed {:.2}",
        last.traffic.total_vehicles,
        last.traffic.traffic_density,
        last.traffic.congestion_level,
        last.traffic.average_speed
    );

    stage("crowd");
    let peak = sink
        .reports
        .iter()
        .map(|r| r.crowd.total_people())
        .max()
        .unwrap_or(0);
    println!("  peak people in frame: {}", peak);
    println!("  last report: {}", serde_json::to_string(&last.crowd)?);

    stage("pedestrian flow");
    println!(
        "  {} tracks alive, {} with movement, average speed {:.2} px/sample",
        last.flow.total_pedestrians,
        last.flow.movement_patterns.len(),
        last.flow.average_speed
    );
    for (id, pattern) in &last.flow.movement_patterns {
        println!(
            "  track {}: {:?}, {:.1} px traveled",
            id, pattern.direction, pattern.distance_traveled
        );
    }

    stage("parking");
    println!(
        "  {}/{} spots occupied ({:.1}%)",
        last.parking.occupied_spots, last.parking.total_spots, last.parking.occupancy_rate
    );
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}

/// Per-frame detections for the demo street.
fn street_scene(frames: u64, seed: u64) -> Vec<Vec<Detection>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut script = Vec::with_capacity(frames as usize);
    for f in 0..frames as i32 {
        let mut dets = Vec::new();

        // Two pedestrians crossing in opposite directions.
        let jitter = rng.gen_range(-1..=1);
        dets.push(person(40 + f * 4, 200 + jitter));
        dets.push(person(560 - f * 3, 260 - jitter));

        // A waiting group near the corner.
        for (dx, dy) in [(0, 0), (25, 5), (12, 30)] {
            dets.push(person(300 + dx, 80 + dy));
        }

        // Through traffic.
        dets.push(vehicle("car", (f * 9) % 560, 330, 80, 40));
        if f % 3 == 0 {
            dets.push(vehicle("bus", 600 - (f * 5) % 560, 380, 120, 50));
        }

        // Cars settling into the parking row, one every ten frames.
        for slot in 0..(f / 10).min(8) {
            dets.push(vehicle("car", slot * 80 + 4, 8, 72, 440));
        }

        // Low-confidence noise the filter should drop.
        dets.push(Detection::new(BBox::new(10, 10, 30, 30), "person", 0.2));
        script.push(dets);
    }
    script
}

fn person(x: i32, y: i32) -> Detection {
    Detection::new(BBox::new(x, y, x + 20, y + 50), "person", 0.9)
}

fn vehicle(label: &str, x: i32, y: i32, w: i32, h: i32) -> Detection {
    Detection::new(BBox::new(x, y, x + w, y + h), label, 0.85)
}
