use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use urban_vision::analytics::{CrowdMethod, SpotMethod};
use urban_vision::config::VisionConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "URBAN_VISION_CONFIG",
        "URBAN_VISION_SOURCE",
        "URBAN_VISION_CROWD_METHOD",
        "URBAN_VISION_BUFFER_CAPACITY",
        "URBAN_VISION_MAX_AGE",
        "URBAN_VISION_CONFIDENCE",
        "URBAN_VISION_TARGET_CLASSES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "path": "stub://north_gate",
            "width": 800,
            "height": 600,
            "target_fps": 15,
            "max_frames": 300
        },
        "pipeline": {"buffer_capacity": 16, "read_timeout_ms": 250},
        "detection": {"confidence_threshold": 0.6, "backend": "stub"},
        "tracking": {"max_age": 12},
        "traffic": {"fps": 25.0},
        "crowd": {"method": "clustering"},
        "parking": {"method": "grid", "grid_cols": 6, "grid_rows": 2}
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("URBAN_VISION_CONFIG", file.path());
    std::env::set_var("URBAN_VISION_CROWD_METHOD", "density-map");
    std::env::set_var("URBAN_VISION_MAX_AGE", "40");
    std::env::set_var("URBAN_VISION_TARGET_CLASSES", "person, car");

    let cfg = VisionConfig::load().expect("load config");

    assert_eq!(cfg.source.path, "stub://north_gate");
    assert_eq!((cfg.source.width, cfg.source.height), (800, 600));
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.source.max_frames, Some(300));
    assert_eq!(cfg.pipeline.buffer_capacity, 16);
    assert_eq!(cfg.pipeline.read_timeout, Duration::from_millis(250));
    assert_eq!(cfg.detection.confidence_threshold, 0.6);
    assert_eq!(cfg.detection.target_classes, vec!["car", "person"]);
    assert_eq!(cfg.max_age, 40);
    assert_eq!(cfg.traffic_fps, 25.0);
    assert_eq!(cfg.crowd_method, CrowdMethod::DensityMap);
    assert_eq!(cfg.parking.method, SpotMethod::Grid);
    assert_eq!((cfg.parking.grid_cols, cfg.parking.grid_rows), (6, 2));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[source]
path = "stub://plaza"

[crowd]
method = "density_map"

[parking]
method = "contour"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("URBAN_VISION_CONFIG", file.path());

    let cfg = VisionConfig::load().expect("load config");
    assert_eq!(cfg.source.path, "stub://plaza");
    assert_eq!(cfg.crowd_method, CrowdMethod::DensityMap);
    assert_eq!(cfg.parking.method, SpotMethod::Contour);
    assert_eq!(cfg.pipeline.buffer_capacity, 64);

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VisionConfig::load().expect("load config");
    assert!(cfg.source.path.starts_with("stub://"));
    assert_eq!(cfg.pipeline.read_timeout, Duration::from_secs(1));
    assert_eq!(cfg.max_age, 30);
    assert_eq!(cfg.detection.backend, "stub");
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("URBAN_VISION_BUFFER_CAPACITY", "lots");
    assert!(VisionConfig::load().is_err());
    clear_env();

    std::env::set_var("URBAN_VISION_BUFFER_CAPACITY", "0");
    assert!(VisionConfig::load().is_err());
    clear_env();

    std::env::set_var("URBAN_VISION_CROWD_METHOD", "heatmap");
    assert!(VisionConfig::load().is_err());
    clear_env();

    std::env::set_var("URBAN_VISION_CONFIG", "/nonexistent/urban_vision.json");
    assert!(VisionConfig::load().is_err());
    clear_env();
}
