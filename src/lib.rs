//! Urban Vision
//!
//! Real-time urban scene analytics over a stream of camera frames.
//!
//! # Architecture
//!
//! Frames flow one direction per cycle:
//!
//! 1. **Acquisition**: a `FrameSource` feeds a `FramePipeline`, whose
//!    producer thread pushes into a bounded drop-oldest `FrameBuffer`.
//! 2. **Detection**: the `Orchestrator` runs the default `DetectorBackend`
//!    from a `BackendRegistry` and filters by confidence and target class.
//! 3. **Analytics**: the detections feed the person `Tracker` and the
//!    traffic, crowd and parking analyzers.
//! 4. **Reporting**: each cycle yields one `FrameReport` for a `ReportSink`.
//!
//! # Module Structure
//!
//! - `frame`: frames, shapes and the bounded frame buffer
//! - `ingest`: frame sources (raw RGB files, synthetic `stub://` scenes)
//! - `pipeline`: acquisition threads, single and multi camera
//! - `detect`: detection types, backends and the registry
//! - `geometry`: boxes, IoU and distances
//! - `analytics`: tracker, traffic, crowd and parking
//! - `orchestrator`, `report`: per-frame control flow and output
//! - `config`: file + environment configuration

use std::time::{SystemTime, UNIX_EPOCH};

pub mod analytics;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod orchestrator;
pub mod pipeline;
pub mod report;

pub use analytics::{
    CongestionLevel, CrowdAnalyzer, CrowdDensityLevel, CrowdMethod, CrowdReport, Direction,
    FlowReport, MovementPattern, ParkingAnalyzer, ParkingReport, ParkingSpot, SpotMethod, Track,
    TrackId, Tracker, TrafficAnalyzer, TrafficReport,
};
pub use config::VisionConfig;
pub use detect::{
    BackendRegistry, Detection, DetectionCapability, DetectorBackend, ScriptedBackend, StubBackend,
};
pub use frame::{Frame, FrameBuffer, FrameShape, DEFAULT_BUFFER_CAPACITY, DEFAULT_READ_TIMEOUT};
pub use geometry::{iou, BBox, Point};
pub use ingest::{FileConfig, FileSource, FrameSource};
pub use orchestrator::{Orchestrator, OrchestratorSettings, RunSummary};
pub use pipeline::{FramePipeline, MultiCameraPipeline, PipelineStats};
pub use report::{FrameReport, JsonLinesSink, MemorySink, ReportSink};

/// Seconds since the Unix epoch, 0 if the clock is before it.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
