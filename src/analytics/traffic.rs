//! Traffic flow: cumulative vehicle counts, per-frame density and a bounded
//! window of recent reports.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::detect::{Detection, TRAFFIC_VEHICLE_CLASSES};
use crate::frame::FrameShape;
use crate::geometry;

pub const TRAFFIC_HISTORY_LEN: usize = 100;

/// Same-vehicle IoU threshold for frame-to-frame speed pairing.
const SAME_VEHICLE_IOU: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
    Severe,
}

impl CongestionLevel {
    pub fn from_density(density: f64) -> Self {
        if density < 10.0 {
            CongestionLevel::Low
        } else if density < 30.0 {
            CongestionLevel::Medium
        } else if density < 50.0 {
            CongestionLevel::High
        } else {
            CongestionLevel::Severe
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrafficReport {
    /// Cumulative per-class counts since the analyzer was created.
    pub vehicle_count: BTreeMap<String, u64>,
    /// Vehicles in the current frame.
    pub total_vehicles: usize,
    /// Percent of the frame covered by vehicle boxes, capped at 100.
    pub traffic_density: f64,
    pub congestion_level: CongestionLevel,
    /// Mean frame-to-frame displacement of matched vehicles, scaled by fps / 100.
    pub average_speed: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

#[derive(Debug)]
pub struct TrafficAnalyzer {
    fps: f64,
    vehicle_count: BTreeMap<String, u64>,
    history: VecDeque<TrafficReport>,
    previous_vehicles: Vec<Detection>,
}

impl TrafficAnalyzer {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            vehicle_count: BTreeMap::new(),
            history: VecDeque::with_capacity(TRAFFIC_HISTORY_LEN),
            previous_vehicles: Vec::new(),
        }
    }

    pub fn analyze(&mut self, detections: &[Detection], shape: FrameShape) -> TrafficReport {
        let vehicles: Vec<Detection> = detections
            .iter()
            .filter(|d| d.is_class_in(TRAFFIC_VEHICLE_CLASSES))
            .cloned()
            .collect();

        for vehicle in &vehicles {
            *self
                .vehicle_count
                .entry(vehicle.class_label.clone())
                .or_insert(0) += 1;
        }

        let traffic_density = traffic_density(&vehicles, shape);
        let average_speed = estimate_speed(&vehicles, &self.previous_vehicles, self.fps);

        let report = TrafficReport {
            vehicle_count: self.vehicle_count.clone(),
            total_vehicles: vehicles.len(),
            traffic_density,
            congestion_level: CongestionLevel::from_density(traffic_density),
            average_speed,
            timestamp: crate::now_epoch_secs(),
        };

        if self.history.len() == TRAFFIC_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(report.clone());
        self.previous_vehicles = vehicles;
        report
    }

    pub fn vehicle_count(&self) -> &BTreeMap<String, u64> {
        &self.vehicle_count
    }

    /// Recent reports, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TrafficReport> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for TrafficAnalyzer {
    fn default() -> Self {
        Self::new(30.0)
    }
}

/// Vehicle box area over frame area, in percent, capped at 100.
pub fn traffic_density(vehicles: &[Detection], shape: FrameShape) -> f64 {
    let frame_area = shape.area();
    if vehicles.is_empty() || frame_area == 0 {
        return 0.0;
    }
    let vehicle_area: i64 = vehicles.iter().map(|v| v.bbox.area()).sum();
    (vehicle_area as f64 / frame_area as f64 * 100.0).min(100.0)
}

/// Mean center displacement between same-class vehicles overlapping across
/// two frames, times `fps / 100`. Zero when nothing pairs up.
pub fn estimate_speed(current: &[Detection], previous: &[Detection], fps: f64) -> f64 {
    let mut speeds = Vec::new();
    for curr in current {
        for prev in previous {
            if curr.class_label != prev.class_label {
                continue;
            }
            if geometry::iou(&curr.bbox, &prev.bbox) > SAME_VEHICLE_IOU {
                let distance = geometry::distance(curr.bbox.center(), prev.bbox.center());
                speeds.push(distance * fps / 100.0);
            }
        }
    }
    if speeds.is_empty() {
        0.0
    } else {
        speeds.iter().sum::<f64>() / speeds.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn det(label: &str, x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(BBox::new(x1, y1, x2, y2), label, 0.9)
    }

    #[test]
    fn single_car_on_vga_frame() {
        let mut analyzer = TrafficAnalyzer::default();
        let report = analyzer.analyze(&[det("car", 10, 10, 60, 40)], FrameShape::new(640, 480));
        assert_eq!(report.vehicle_count.get("car"), Some(&1));
        assert_eq!(report.vehicle_count.len(), 1);
        assert_eq!(report.total_vehicles, 1);
        assert!((report.traffic_density - 0.48828125).abs() < 1e-9);
        assert_eq!(report.congestion_level, CongestionLevel::Low);
        assert!(report.timestamp > 0.0);
    }

    #[test]
    fn congestion_boundaries_are_exact() {
        assert_eq!(CongestionLevel::from_density(9.999), CongestionLevel::Low);
        assert_eq!(CongestionLevel::from_density(10.0), CongestionLevel::Medium);
        assert_eq!(CongestionLevel::from_density(29.999), CongestionLevel::Medium);
        assert_eq!(CongestionLevel::from_density(30.0), CongestionLevel::High);
        assert_eq!(CongestionLevel::from_density(49.999), CongestionLevel::High);
        assert_eq!(CongestionLevel::from_density(50.0), CongestionLevel::Severe);
    }

    #[test]
    fn counts_accumulate_and_ignore_other_classes() {
        let mut analyzer = TrafficAnalyzer::default();
        let shape = FrameShape::new(640, 480);
        analyzer.analyze(
            &[det("car", 0, 0, 10, 10), det("person", 0, 0, 10, 10)],
            shape,
        );
        let report = analyzer.analyze(
            &[det("car", 0, 0, 10, 10), det("bus", 20, 20, 40, 40), det("tram", 0, 0, 5, 5)],
            shape,
        );
        assert_eq!(report.vehicle_count.get("car"), Some(&2));
        assert_eq!(report.vehicle_count.get("bus"), Some(&1));
        assert!(!report.vehicle_count.contains_key("person"));
        assert_eq!(report.total_vehicles, 2);
    }

    #[test]
    fn density_caps_at_one_hundred_and_guards_zero_area() {
        let big = [det("truck", 0, 0, 100, 100), det("bus", 0, 0, 100, 100)];
        assert_eq!(traffic_density(&big, FrameShape::new(100, 100)), 100.0);
        assert_eq!(traffic_density(&big, FrameShape::new(0, 100)), 0.0);
        assert_eq!(traffic_density(&[], FrameShape::new(100, 100)), 0.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut analyzer = TrafficAnalyzer::default();
        for _ in 0..(TRAFFIC_HISTORY_LEN + 5) {
            analyzer.analyze(&[], FrameShape::new(64, 48));
        }
        assert_eq!(analyzer.history_len(), TRAFFIC_HISTORY_LEN);
    }

    #[test]
    fn speed_pairs_same_class_overlapping_boxes() {
        let previous = [det("car", 0, 0, 100, 50), det("bus", 0, 0, 100, 50)];
        let current = [det("car", 10, 0, 110, 50)];
        // center moved 10 px; 10 * 30 / 100
        assert!((estimate_speed(&current, &previous, 30.0) - 3.0).abs() < 1e-12);
        assert_eq!(estimate_speed(&current, &[], 30.0), 0.0);

        let mut analyzer = TrafficAnalyzer::new(30.0);
        let shape = FrameShape::new(640, 480);
        assert_eq!(analyzer.analyze(&previous, shape).average_speed, 0.0);
        assert!((analyzer.analyze(&current, shape).average_speed - 3.0).abs() < 1e-12);
    }
}
