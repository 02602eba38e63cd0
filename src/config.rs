use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analytics::{CrowdMethod, SpotMethod};
use crate::detect::DEFAULT_TARGET_CLASSES;
use crate::frame::{DEFAULT_BUFFER_CAPACITY, DEFAULT_READ_TIMEOUT};
use crate::ingest::FileConfig;

const DEFAULT_SOURCE_PATH: &str = "stub://street_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_BACKEND: &str = "stub";
/// Registry name of the script-replaying detector.
pub const SCRIPTED_BACKEND: &str = "scripted";
const DEFAULT_TRAFFIC_FPS: f64 = 30.0;

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    source: Option<SourceConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    detection: Option<DetectionConfigFile>,
    tracking: Option<TrackingConfigFile>,
    traffic: Option<TrafficConfigFile>,
    crowd: Option<CrowdConfigFile>,
    parking: Option<ParkingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    buffer_capacity: Option<usize>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    target_classes: Option<Vec<String>>,
    backend: Option<String>,
    script_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    max_age: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrafficConfigFile {
    fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct CrowdConfigFile {
    method: Option<CrowdMethod>,
}

#[derive(Debug, Deserialize, Default)]
struct ParkingConfigFile {
    method: Option<SpotMethod>,
    grid_cols: Option<u32>,
    grid_rows: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub source: SourceSettings,
    pub pipeline: PipelineSettings,
    pub detection: DetectionSettings,
    pub max_age: u32,
    pub traffic_fps: f64,
    pub crowd_method: CrowdMethod,
    pub parking: ParkingSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub max_frames: Option<u64>,
}

impl SourceSettings {
    pub fn file_config(&self) -> FileConfig {
        FileConfig {
            path: self.path.clone(),
            width: self.width,
            height: self.height,
            target_fps: self.target_fps,
            max_frames: self.max_frames,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub buffer_capacity: usize,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub target_classes: Vec<String>,
    /// Registry name of the detector backend (`stub` or `scripted`).
    pub backend: String,
    /// Per-frame detection script for the `scripted` backend.
    pub script_path: Option<PathBuf>,
}

impl DetectionSettings {
    /// Replay detections from `path`. Returns the backend it displaced, if
    /// a different one was configured.
    pub fn use_script(&mut self, path: PathBuf) -> Option<String> {
        self.script_path = Some(path);
        if self.backend == SCRIPTED_BACKEND {
            return None;
        }
        Some(std::mem::replace(
            &mut self.backend,
            SCRIPTED_BACKEND.to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct ParkingSettings {
    pub method: SpotMethod,
    pub grid_cols: u32,
    pub grid_rows: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        // An empty file struct maps every field to its default.
        Self::from_file(VisionConfigFile::default())
    }
}

impl VisionConfig {
    /// Defaults, then the file named by `URBAN_VISION_CONFIG`, then env
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("URBAN_VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a JSON config document without consulting the environment.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: VisionConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisionConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let parking = file.parking.unwrap_or_default();

        Self {
            source: SourceSettings {
                path: source
                    .path
                    .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                max_frames: source.max_frames,
            },
            pipeline: PipelineSettings {
                buffer_capacity: pipeline.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
                read_timeout: pipeline
                    .read_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_READ_TIMEOUT),
            },
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE),
                target_classes: detection.target_classes.unwrap_or_else(|| {
                    DEFAULT_TARGET_CLASSES
                        .iter()
                        .map(|c| c.to_string())
                        .collect()
                }),
                backend: detection
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                script_path: detection.script_path,
            },
            max_age: file
                .tracking
                .and_then(|t| t.max_age)
                .unwrap_or(crate::analytics::tracker::DEFAULT_MAX_AGE),
            traffic_fps: file
                .traffic
                .and_then(|t| t.fps)
                .unwrap_or(DEFAULT_TRAFFIC_FPS),
            crowd_method: file.crowd.and_then(|c| c.method).unwrap_or_default(),
            parking: ParkingSettings {
                method: parking.method.unwrap_or_default(),
                grid_cols: parking
                    .grid_cols
                    .unwrap_or(crate::analytics::parking::DEFAULT_GRID.0),
                grid_rows: parking
                    .grid_rows
                    .unwrap_or(crate::analytics::parking::DEFAULT_GRID.1),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("URBAN_VISION_SOURCE") {
            if !path.trim().is_empty() {
                self.source.path = path;
            }
        }
        if let Ok(method) = std::env::var("URBAN_VISION_CROWD_METHOD") {
            if !method.trim().is_empty() {
                self.crowd_method = method.parse()?;
            }
        }
        if let Ok(capacity) = std::env::var("URBAN_VISION_BUFFER_CAPACITY") {
            self.pipeline.buffer_capacity = capacity.trim().parse().map_err(|_| {
                anyhow!("URBAN_VISION_BUFFER_CAPACITY must be a positive integer")
            })?;
        }
        if let Ok(max_age) = std::env::var("URBAN_VISION_MAX_AGE") {
            self.max_age = max_age
                .trim()
                .parse()
                .map_err(|_| anyhow!("URBAN_VISION_MAX_AGE must be an integer frame count"))?;
        }
        if let Ok(confidence) = std::env::var("URBAN_VISION_CONFIDENCE") {
            self.detection.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("URBAN_VISION_CONFIDENCE must be a number"))?;
        }
        if let Ok(classes) = std::env::var("URBAN_VISION_TARGET_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.detection.target_classes = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.pipeline.buffer_capacity == 0 {
            return Err(anyhow!("pipeline buffer_capacity must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within [0, 1] (got {})",
                self.detection.confidence_threshold
            ));
        }
        if !(self.traffic_fps.is_finite() && self.traffic_fps > 0.0) {
            return Err(anyhow!("traffic fps must be greater than zero"));
        }
        if self.parking.grid_cols == 0 || self.parking.grid_rows == 0 {
            return Err(anyhow!("parking grid must have at least one column and row"));
        }
        self.detection.target_classes = self
            .detection
            .target_classes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        self.detection.target_classes.sort();
        self.detection.target_classes.dedup();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
