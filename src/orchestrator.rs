//! Per-frame control flow.
//!
//! For each frame pulled from the pipeline: run the person-capable detector
//! (the registry default when it qualifies), filter
//! by confidence and target class, then feed the tracker and the traffic,
//! crowd and parking analyzers, and hand the combined `FrameReport` to a
//! sink. All analytics state lives here, on the consumer side.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::analytics::{
    CrowdAnalyzer, CrowdMethod, ParkingAnalyzer, SpotMethod, TrafficAnalyzer, Tracker,
};
use crate::config::VisionConfig;
use crate::detect::{
    filter_urban_objects, BackendRegistry, DetectionCapability, SharedBackend,
    DEFAULT_TARGET_CLASSES,
};
use crate::frame::{Frame, DEFAULT_READ_TIMEOUT};
use crate::pipeline::{FramePipeline, PipelineStats};
use crate::report::{FrameReport, ReportSink};

/// Analytics knobs, usually derived from `VisionConfig`.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub confidence_threshold: f32,
    pub target_classes: Vec<String>,
    pub max_age: u32,
    pub traffic_fps: f64,
    pub crowd_method: CrowdMethod,
    pub spot_method: SpotMethod,
    pub spot_grid: (u32, u32),
    pub read_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            target_classes: DEFAULT_TARGET_CLASSES.iter().map(|c| c.to_string()).collect(),
            max_age: crate::analytics::tracker::DEFAULT_MAX_AGE,
            traffic_fps: 30.0,
            crowd_method: CrowdMethod::default(),
            spot_method: SpotMethod::default(),
            spot_grid: crate::analytics::parking::DEFAULT_GRID,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl From<&VisionConfig> for OrchestratorSettings {
    fn from(cfg: &VisionConfig) -> Self {
        Self {
            confidence_threshold: cfg.detection.confidence_threshold,
            target_classes: cfg.detection.target_classes.clone(),
            max_age: cfg.max_age,
            traffic_fps: cfg.traffic_fps,
            crowd_method: cfg.crowd_method,
            spot_method: cfg.parking.method,
            spot_grid: (cfg.parking.grid_cols, cfg.parking.grid_rows),
            read_timeout: cfg.pipeline.read_timeout,
        }
    }
}

/// Totals for one `run`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub reports_emitted: u64,
    /// Oldest frame seen, measured from capture to analysis.
    pub max_frame_age: Duration,
    pub pipeline: PipelineStats,
}

pub struct Orchestrator {
    detectors: BackendRegistry,
    detector: Option<SharedBackend>,
    settings: OrchestratorSettings,
    tracker: Tracker,
    traffic: TrafficAnalyzer,
    crowd: CrowdAnalyzer,
    parking: ParkingAnalyzer,
    spots_generated: bool,
}

impl Orchestrator {
    pub fn new(detectors: BackendRegistry, settings: OrchestratorSettings) -> Self {
        Self {
            tracker: Tracker::new(settings.max_age),
            traffic: TrafficAnalyzer::new(settings.traffic_fps),
            crowd: CrowdAnalyzer::new(settings.crowd_method),
            parking: ParkingAnalyzer::new(),
            spots_generated: false,
            detector: None,
            detectors,
            settings,
        }
    }

    /// Use a fixed spot set instead of generating one from the first frame.
    pub fn with_parking(mut self, parking: ParkingAnalyzer) -> Self {
        self.parking = parking;
        self.spots_generated = true;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn traffic(&self) -> &TrafficAnalyzer {
        &self.traffic
    }

    pub fn parking(&self) -> &ParkingAnalyzer {
        &self.parking
    }

    /// Replace the parking spot set from `frame` with the configured method.
    pub fn regenerate_spots(&mut self, frame: &Frame) -> Result<usize> {
        let spots = self.parking.regenerate_spots(
            frame,
            self.settings.spot_method,
            self.settings.spot_grid,
        )?;
        self.spots_generated = true;
        Ok(spots.len())
    }

    /// The backend serving person detection, chosen and warmed up on first
    /// use. Vehicle analytics share it, so a backend without vehicle
    /// support is used with a warning.
    pub fn detector(&mut self) -> Result<SharedBackend> {
        if let Some(detector) = &self.detector {
            return Ok(detector.clone());
        }
        let backend = self
            .detectors
            .backend_for_capability(DetectionCapability::PersonDetection)?;
        {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            if !guard.supports(DetectionCapability::VehicleDetection) {
                log::warn!(
                    "detector {} has no vehicle detection; traffic and parking will see no vehicles",
                    guard.name()
                );
            }
            guard.warm_up()?;
            log::info!("detector {} ready", guard.name());
        }
        self.detector = Some(backend.clone());
        Ok(backend)
    }

    /// Detect, filter and analyze one frame.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        if !self.spots_generated {
            self.regenerate_spots(frame)?;
        }

        let detector = self.detector()?;
        let raw = detector
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?
            .detect(frame)?;
        let detections = filter_urban_objects(
            &raw,
            &self.settings.target_classes,
            self.settings.confidence_threshold,
        );

        let shape = frame.shape();
        let tracks = self.tracker.update(&detections);
        let flow = self.tracker.analyze_flow(&tracks);
        let traffic = self.traffic.analyze(&detections, shape);
        let crowd = self.crowd.analyze(&detections, shape);
        let parking = self.parking.analyze_occupancy(&detections);

        log::debug!(
            "frame {}: {} detections ({} kept), {} tracks, {} vehicles, {} people, {}/{} spots occupied",
            frame.index,
            raw.len(),
            detections.len(),
            tracks.len(),
            traffic.total_vehicles,
            crowd.total_people(),
            parking.occupied_spots,
            parking.total_spots
        );

        Ok(FrameReport {
            frame_index: frame.index,
            traffic,
            crowd,
            parking,
            tracks,
            flow,
        })
    }

    /// Start `pipeline` and process frames until a read times out with no
    /// data. The pipeline is stopped on every exit path.
    pub fn run(
        &mut self,
        pipeline: &mut FramePipeline,
        sink: &mut dyn ReportSink,
    ) -> Result<RunSummary> {
        let never = AtomicBool::new(false);
        self.run_until(pipeline, sink, &never)
    }

    /// Like `run`, but also ends once `stop` is set.
    pub fn run_until(
        &mut self,
        pipeline: &mut FramePipeline,
        sink: &mut dyn ReportSink,
        stop: &AtomicBool,
    ) -> Result<RunSummary> {
        // Warm up before acquisition so a bad detector never opens the source.
        let detector = self.detector()?;
        let detector_name = detector
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?
            .name();
        pipeline.start()?;
        log::info!(
            "orchestrator running (crowd={:?}, parking={:?}, detector={})",
            self.settings.crowd_method,
            self.settings.spot_method,
            detector_name
        );

        let mut summary = RunSummary::default();
        let result = self.drain(pipeline, sink, stop, &mut summary);
        let stopped = pipeline.stop();
        summary.pipeline = pipeline.stats();

        result?;
        stopped?;
        log::info!(
            "orchestrator finished: {} frames processed, {} dropped by pipeline",
            summary.frames_processed,
            summary.pipeline.frames_dropped
        );
        Ok(summary)
    }

    fn drain(
        &mut self,
        pipeline: &FramePipeline,
        sink: &mut dyn ReportSink,
        stop: &AtomicBool,
        summary: &mut RunSummary,
    ) -> Result<()> {
        while !stop.load(Ordering::SeqCst) {
            let Some(frame) = pipeline.read(self.settings.read_timeout) else {
                log::info!("no frame within {:?}, ending run", self.settings.read_timeout);
                break;
            };
            let age = frame.age();
            if age > self.settings.read_timeout {
                log::warn!("frame {} is stale ({:?} since capture)", frame.index, age);
            }
            summary.max_frame_age = summary.max_frame_age.max(age);
            let report = self.process_frame(&frame)?;
            summary.frames_processed += 1;
            sink.emit(&report)?;
            summary.reports_emitted += 1;
        }
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, ScriptedBackend};
    use crate::frame::FrameShape;
    use crate::geometry::BBox;
    use crate::report::MemorySink;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Counts warm-ups and detections; supports only the listed capability.
    struct CountingDetector {
        name: &'static str,
        capability: DetectionCapability,
        warm_ups: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingDetector {
        fn new(name: &'static str, capability: DetectionCapability) -> Self {
            Self {
                name,
                capability,
                warm_ups: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl crate::detect::DetectorBackend for CountingDetector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            capability == self.capability
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn warm_up(&mut self) -> Result<()> {
            self.warm_ups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scripted(script: Vec<Vec<Detection>>) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(ScriptedBackend::new(script));
        registry
    }

    #[test]
    fn filters_before_analyzers() {
        let registry = scripted(vec![vec![
            Detection::new(BBox::new(10, 10, 60, 40), "car", 0.9),
            Detection::new(BBox::new(100, 100, 150, 130), "car", 0.3),
            Detection::new(BBox::new(200, 200, 220, 260), "person", 0.8),
            Detection::new(BBox::new(300, 300, 320, 320), "dog", 0.99),
        ]]);
        let mut orchestrator = Orchestrator::new(registry, OrchestratorSettings::default());
        let frame = Frame::blank(FrameShape::new(640, 480), 0);
        let report = orchestrator.process_frame(&frame).unwrap();

        assert_eq!(report.traffic.total_vehicles, 1);
        assert_eq!(report.crowd.total_people(), 1);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.parking.total_spots, 100);
        assert_eq!(report.flow.total_pedestrians, 1);
    }

    #[test]
    fn spots_are_generated_once() {
        let registry = scripted(vec![vec![], vec![]]);
        let settings = OrchestratorSettings {
            spot_grid: (2, 2),
            ..OrchestratorSettings::default()
        };
        let mut orchestrator = Orchestrator::new(registry, settings);
        orchestrator
            .process_frame(&Frame::blank(FrameShape::new(100, 100), 0))
            .unwrap();
        let report = orchestrator
            .process_frame(&Frame::blank(FrameShape::new(400, 400), 1))
            .unwrap();
        assert_eq!(report.parking.total_spots, 4);
        assert_eq!(report.parking.spots_detail[3].bbox, BBox::new(50, 50, 100, 100));
    }

    #[test]
    fn detector_is_chosen_by_person_capability_and_warmed_once() {
        let vehicles = CountingDetector::new("vehicles", DetectionCapability::VehicleDetection);
        let people = CountingDetector::new("people", DetectionCapability::PersonDetection);
        let (vehicle_calls, vehicle_warm_ups) = (vehicles.calls.clone(), vehicles.warm_ups.clone());
        let (people_calls, people_warm_ups) = (people.calls.clone(), people.warm_ups.clone());

        let mut registry = BackendRegistry::new();
        registry.register(vehicles);
        registry.register(people);
        assert_eq!(registry.default_name(), Some("vehicles"));

        let mut orchestrator = Orchestrator::new(registry, OrchestratorSettings::default());
        for index in 0..3 {
            orchestrator
                .process_frame(&Frame::blank(FrameShape::new(64, 48), index))
                .unwrap();
        }
        assert_eq!(people_calls.load(Ordering::SeqCst), 3);
        assert_eq!(people_warm_ups.load(Ordering::SeqCst), 1);
        assert_eq!(vehicle_calls.load(Ordering::SeqCst), 0);
        assert_eq!(vehicle_warm_ups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn run_warms_up_before_reading_frames() {
        let detector = CountingDetector::new("people", DetectionCapability::PersonDetection);
        let warm_ups = detector.warm_ups.clone();
        let mut registry = BackendRegistry::new();
        registry.register(detector);
        let mut orchestrator = Orchestrator::new(registry, OrchestratorSettings::default());

        let source = crate::ingest::FileSource::new(crate::ingest::FileConfig {
            path: "stub://warm".to_string(),
            width: 16,
            height: 16,
            target_fps: 0,
            max_frames: Some(2),
        })
        .unwrap();
        let mut pipeline = FramePipeline::with_capacity(source, 4);
        let stop = AtomicBool::new(true);
        orchestrator
            .run_until(&mut pipeline, &mut MemorySink::default(), &stop)
            .unwrap();
        assert_eq!(warm_ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_detector_is_an_error() {
        let mut orchestrator =
            Orchestrator::new(BackendRegistry::new(), OrchestratorSettings::default());
        let frame = Frame::blank(FrameShape::new(64, 48), 0);
        assert!(orchestrator.process_frame(&frame).is_err());

        let mut registry = BackendRegistry::new();
        registry.register(CountingDetector::new(
            "vehicles",
            DetectionCapability::VehicleDetection,
        ));
        let mut vehicles_only = Orchestrator::new(registry, OrchestratorSettings::default());
        assert!(vehicles_only.process_frame(&frame).is_err());
    }

    #[test]
    fn run_stops_when_flag_is_set() {
        let registry = scripted(Vec::new());
        let mut orchestrator = Orchestrator::new(registry, OrchestratorSettings::default());
        let source = crate::ingest::FileSource::new(crate::ingest::FileConfig {
            path: "stub://idle".to_string(),
            width: 32,
            height: 24,
            target_fps: 0,
            max_frames: None,
        })
        .unwrap();
        let mut pipeline = FramePipeline::with_capacity(source, 4);
        let mut sink = MemorySink::default();
        let stop = AtomicBool::new(true);
        let summary = orchestrator.run_until(&mut pipeline, &mut sink, &stop).unwrap();
        assert_eq!(summary.frames_processed, 0);
        assert!(sink.reports.is_empty());
        assert!(!pipeline.is_running());
    }
}
