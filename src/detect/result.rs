use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

pub const PERSON_CLASS: &str = "person";

/// Classes the traffic analyzer counts.
pub const TRAFFIC_VEHICLE_CLASSES: &[&str] = &["car", "bus", "truck", "motorcycle"];

/// Classes that can occupy a parking spot.
pub const PARKING_VEHICLE_CLASSES: &[&str] = &["car", "bus", "truck"];

/// Classes kept by the orchestrator when no allowlist is configured.
pub const DEFAULT_TARGET_CLASSES: &[&str] =
    &["person", "car", "bus", "truck", "motorcycle", "bicycle"];

/// One object reported by a detector backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Pixel corners `[x1, y1, x2, y2]`.
    pub bbox: BBox,
    /// Detector class label, e.g. "person" or "car".
    #[serde(rename = "class_name")]
    pub class_label: String,
    /// Score in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_label: class_label.into(),
            confidence,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_label == PERSON_CLASS
    }

    pub fn is_class_in(&self, classes: &[&str]) -> bool {
        classes.iter().any(|c| *c == self.class_label)
    }
}

/// Keep detections whose class is in `target_classes` and whose confidence
/// reaches `min_confidence`. Degenerate boxes are dropped with a warning.
pub fn filter_urban_objects<S: AsRef<str>>(
    detections: &[Detection],
    target_classes: &[S],
    min_confidence: f32,
) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| {
            if d.bbox.is_degenerate() {
                log::warn!(
                    "dropping degenerate {} box {:?}",
                    d.class_label,
                    d.bbox
                );
                return false;
            }
            d.confidence >= min_confidence
                && target_classes.iter().any(|c| c.as_ref() == d.class_label)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_confident_target_classes() {
        let detections = vec![
            Detection::new(BBox::new(0, 0, 10, 10), "person", 0.9),
            Detection::new(BBox::new(0, 0, 10, 10), "car", 0.4),
            Detection::new(BBox::new(0, 0, 10, 10), "giraffe", 0.99),
            Detection::new(BBox::new(10, 10, 5, 5), "bus", 0.99),
            Detection::new(BBox::new(0, 0, 10, 10), "bicycle", 0.5),
        ];
        let kept = filter_urban_objects(&detections, DEFAULT_TARGET_CLASSES, 0.5);
        let labels: Vec<_> = kept.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, vec!["person", "bicycle"]);
    }

    #[test]
    fn deserializes_detector_json() {
        let json = r#"{"bbox":[10,10,60,40],"class_name":"car","confidence":0.8}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bbox, BBox::new(10, 10, 60, 40));
        assert!(det.is_class_in(TRAFFIC_VEHICLE_CLASSES));
        assert!(!det.is_person());
    }
}
