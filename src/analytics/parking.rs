//! Parking occupancy.
//!
//! The spot set is generated once per camera view, from a grid or from
//! square-ish contours in the frame, and is then fixed. Each frame only
//! updates per-spot occupancy and confidence.

use anyhow::{anyhow, Result};
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::point::Point as PixelPoint;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::detect::{Detection, PARKING_VEHICLE_CLASSES};
use crate::frame::{Frame, FrameShape};
use crate::geometry::{self, BBox};

pub const OCCUPIED_IOU_THRESHOLD: f64 = 0.3;
pub const DEFAULT_GRID: (u32, u32) = (10, 10);

const CONTOUR_MIN_AREA: f64 = 1000.0;
const CONTOUR_MAX_AREA: f64 = 10000.0;
const CONTOUR_MIN_ASPECT: f64 = 0.8;
const CONTOUR_MAX_ASPECT: f64 = 1.2;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
// Roughly a 5x5 kernel.
const BLUR_SIGMA: f32 = 1.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotMethod {
    #[default]
    Grid,
    Contour,
}

impl FromStr for SpotMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(SpotMethod::Grid),
            "contour" => Ok(SpotMethod::Contour),
            other => Err(anyhow!(
                "unknown parking spot method '{}' (expected grid or contour)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParkingSpot {
    pub id: usize,
    pub bbox: BBox,
    pub occupied: bool,
    /// Best IoU against any vehicle in the last analyzed frame.
    pub confidence: f64,
}

impl ParkingSpot {
    fn vacant(id: usize, bbox: BBox) -> Self {
        Self {
            id,
            bbox,
            occupied: false,
            confidence: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParkingReport {
    pub total_spots: usize,
    pub occupied_spots: usize,
    pub available_spots: usize,
    /// Percent of spots occupied; 0 when there are no spots.
    pub occupancy_rate: f64,
    pub spots_detail: Vec<ParkingSpot>,
}

#[derive(Debug, Default)]
pub struct ParkingAnalyzer {
    spots: Vec<ParkingSpot>,
}

impl ParkingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spots(spots: Vec<ParkingSpot>) -> Self {
        Self { spots }
    }

    pub fn spots(&self) -> &[ParkingSpot] {
        &self.spots
    }

    /// Replace the whole spot set using `method` on `frame`.
    pub fn regenerate_spots(
        &mut self,
        frame: &Frame,
        method: SpotMethod,
        grid: (u32, u32),
    ) -> Result<&[ParkingSpot]> {
        self.spots = match method {
            SpotMethod::Grid => grid_spots(frame.shape(), grid.0, grid.1),
            SpotMethod::Contour => contour_spots(frame)?,
        };
        log::info!(
            "parking: generated {} spots ({:?}) for {}x{} frame",
            self.spots.len(),
            method,
            frame.width,
            frame.height
        );
        Ok(&self.spots)
    }

    /// Classify every spot against the car/bus/truck detections of a frame.
    pub fn analyze_occupancy(&mut self, detections: &[Detection]) -> ParkingReport {
        let vehicles: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.is_class_in(PARKING_VEHICLE_CLASSES))
            .collect();

        for spot in self.spots.iter_mut() {
            let max_iou = vehicles
                .iter()
                .map(|v| geometry::iou(&spot.bbox, &v.bbox))
                .fold(0.0f64, f64::max);
            spot.occupied = max_iou > OCCUPIED_IOU_THRESHOLD;
            spot.confidence = max_iou;
        }

        let total_spots = self.spots.len();
        let occupied_spots = self.spots.iter().filter(|s| s.occupied).count();
        let occupancy_rate = if total_spots == 0 {
            0.0
        } else {
            occupied_spots as f64 / total_spots as f64 * 100.0
        };

        ParkingReport {
            total_spots,
            occupied_spots,
            available_spots: total_spots - occupied_spots,
            occupancy_rate,
            spots_detail: self.spots.clone(),
        }
    }
}

/// `cols x rows` equal cells (integer division), ids column by column.
pub fn grid_spots(shape: FrameShape, cols: u32, rows: u32) -> Vec<ParkingSpot> {
    if cols == 0 || rows == 0 {
        return Vec::new();
    }
    let cell_w = (shape.width / cols) as i32;
    let cell_h = (shape.height / rows) as i32;
    let mut spots = Vec::with_capacity((cols * rows) as usize);
    for i in 0..cols as i32 {
        for j in 0..rows as i32 {
            let x1 = i * cell_w;
            let y1 = j * cell_h;
            spots.push(ParkingSpot::vacant(
                spots.len(),
                BBox::new(x1, y1, x1 + cell_w, y1 + cell_h),
            ));
        }
    }
    spots
}

/// Outer contours of the frame's edge map that look like a parking bay.
pub fn contour_spots(frame: &Frame) -> Result<Vec<ParkingSpot>> {
    let gray = frame.to_gray()?;
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let mut spots = Vec::new();
    for contour in find_contours::<i32>(&edges) {
        if contour.parent.is_some() || contour.border_type != BorderType::Outer {
            continue;
        }
        let Some(bbox) = bounding_rect(&contour.points) else {
            continue;
        };
        let area = polygon_area(&contour.points);
        if is_spot_candidate(area, bbox.width(), bbox.height()) {
            spots.push(ParkingSpot::vacant(spots.len(), bbox));
        }
    }
    Ok(spots)
}

fn is_spot_candidate(area: f64, width: i64, height: i64) -> bool {
    if height <= 0 || !(CONTOUR_MIN_AREA < area && area < CONTOUR_MAX_AREA) {
        return false;
    }
    let aspect = width as f64 / height as f64;
    CONTOUR_MIN_ASPECT < aspect && aspect < CONTOUR_MAX_ASPECT
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice.abs() as f64) / 2.0
}

/// Inclusive pixel bounds as a box, matching `x + w` / `y + h` corners.
fn bounding_rect(points: &[PixelPoint<i32>]) -> Option<BBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BBox::new(min_x, min_y, max_x + 1, max_y + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(BBox::new(x1, y1, x2, y2), "car", 0.9)
    }

    #[test]
    fn grid_covers_frame_column_major() {
        let spots = grid_spots(FrameShape::new(640, 480), 10, 10);
        assert_eq!(spots.len(), 100);
        assert_eq!(spots[0].bbox, BBox::new(0, 0, 64, 48));
        assert_eq!(spots[1].bbox, BBox::new(0, 48, 64, 96));
        assert_eq!(spots[10].bbox, BBox::new(64, 0, 128, 48));
        assert_eq!(spots[99].bbox, BBox::new(576, 432, 640, 480));
        assert!(spots.iter().enumerate().all(|(i, s)| s.id == i));
        assert!(grid_spots(FrameShape::new(640, 480), 0, 10).is_empty());
    }

    #[test]
    fn occupancy_uses_vehicle_iou() {
        let mut analyzer = ParkingAnalyzer::with_spots(grid_spots(FrameShape::new(200, 100), 2, 1));
        let report = analyzer.analyze_occupancy(&[
            car(0, 0, 100, 100),
            Detection::new(BBox::new(100, 0, 200, 100), "person", 0.9),
        ]);
        assert_eq!(report.total_spots, 2);
        assert_eq!(report.occupied_spots, 1);
        assert_eq!(report.available_spots, 1);
        assert_eq!(report.occupancy_rate, 50.0);
        assert!(report.spots_detail[0].occupied);
        assert_eq!(report.spots_detail[0].confidence, 1.0);
        assert!(!report.spots_detail[1].occupied);
        assert_eq!(report.spots_detail[1].confidence, 0.0);
    }

    #[test]
    fn confidence_reported_even_when_vacant() {
        let mut analyzer = ParkingAnalyzer::with_spots(grid_spots(FrameShape::new(100, 100), 1, 1));
        // 20x100 overlap: IoU 0.2
        let report = analyzer.analyze_occupancy(&[car(80, 0, 100, 100)]);
        assert!(!report.spots_detail[0].occupied);
        assert!((report.spots_detail[0].confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn occupancy_resets_when_vehicle_leaves() {
        let mut analyzer = ParkingAnalyzer::with_spots(grid_spots(FrameShape::new(100, 100), 1, 1));
        assert_eq!(analyzer.analyze_occupancy(&[car(0, 0, 100, 100)]).occupied_spots, 1);
        assert_eq!(analyzer.analyze_occupancy(&[]).occupied_spots, 0);
        assert_eq!(analyzer.spots().len(), 1);
    }

    #[test]
    fn no_spots_means_zero_rate() {
        let mut analyzer = ParkingAnalyzer::new();
        let report = analyzer.analyze_occupancy(&[car(0, 0, 10, 10)]);
        assert_eq!(report.total_spots, 0);
        assert_eq!(report.occupancy_rate, 0.0);
    }

    #[test]
    fn regenerate_replaces_whole_set() {
        let frame = Frame::blank(FrameShape::new(640, 480), 0);
        let mut analyzer = ParkingAnalyzer::new();
        assert_eq!(
            analyzer.regenerate_spots(&frame, SpotMethod::Grid, (4, 2)).unwrap().len(),
            8
        );
        assert_eq!(
            analyzer.regenerate_spots(&frame, SpotMethod::Grid, DEFAULT_GRID).unwrap().len(),
            100
        );
    }

    #[test]
    fn blank_frame_has_no_contour_spots() {
        let frame = Frame::blank(FrameShape::new(160, 120), 0);
        assert!(contour_spots(&frame).unwrap().is_empty());
    }

    #[test]
    fn bright_square_becomes_one_contour_spot() {
        let shape = FrameShape::new(200, 160);
        let mut pixels = vec![0u8; shape.byte_len()];
        for y in 50..110u32 {
            for x in 70..130u32 {
                let i = ((y * shape.width + x) * 3) as usize;
                pixels[i..i + 3].fill(255);
            }
        }
        let frame = Frame::new(pixels, shape.width, shape.height, 0).unwrap();
        let spots = contour_spots(&frame).unwrap();
        assert_eq!(spots.len(), 1, "{:?}", spots);
        // edge ring sits one pixel outside the 70..130 x 50..110 square
        assert_eq!(spots[0].bbox, BBox::new(69, 49, 131, 111));
        assert_eq!(spots[0].id, 0);
        assert!(!spots[0].occupied);

        let mut analyzer = ParkingAnalyzer::new();
        analyzer
            .regenerate_spots(&frame, SpotMethod::Contour, DEFAULT_GRID)
            .unwrap();
        let report = analyzer.analyze_occupancy(&[car(70, 50, 130, 110)]);
        assert_eq!(report.total_spots, 1);
        assert_eq!(report.occupied_spots, 1);
    }

    #[test]
    fn candidate_filter_bounds_are_exclusive() {
        assert!(is_spot_candidate(3600.0, 60, 60));
        assert!(!is_spot_candidate(1000.0, 32, 32));
        assert!(!is_spot_candidate(10000.0, 100, 100));
        assert!(!is_spot_candidate(3000.0, 120, 25));
        assert!(!is_spot_candidate(3000.0, 60, 0));
    }

    #[test]
    fn shoelace_area_of_square() {
        let square = [
            PixelPoint::new(0, 0),
            PixelPoint::new(10, 0),
            PixelPoint::new(10, 10),
            PixelPoint::new(0, 10),
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(bounding_rect(&square), Some(BBox::new(0, 0, 11, 11)));
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn method_parses() {
        assert_eq!("Grid".parse::<SpotMethod>().unwrap(), SpotMethod::Grid);
        assert_eq!("contour".parse::<SpotMethod>().unwrap(), SpotMethod::Contour);
        assert!("learned".parse::<SpotMethod>().is_err());
    }
}
