//! Axis-aligned box geometry shared by the tracker and the analyzers.
//!
//! Boxes use integer pixel corners `(x1, y1, x2, y2)`. A box with `x2 <= x1`
//! or `y2 <= y1` is degenerate: its area is zero and it never overlaps
//! anything.

use serde::{Deserialize, Serialize};

/// A pixel-space center point `(x, y)`.
pub type Point = (f64, f64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        (self.x2 as i64 - self.x1 as i64).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y2 as i64 - self.y1 as i64).max(0)
    }

    /// Area in square pixels. Zero for degenerate boxes.
    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn is_degenerate(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn center(&self) -> Point {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    /// Intersection-over-union with `other`, always in `[0, 1]`.
    pub fn iou(&self, other: &BBox) -> f64 {
        iou(self, other)
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Intersection-over-union of two boxes.
///
/// Returns 0.0 when the boxes do not overlap (touching edges count as no
/// overlap) or when the union area is zero.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    let ix1 = a.x1.max(b.x1) as i64;
    let iy1 = a.y1.max(b.y1) as i64;
    let ix2 = a.x2.min(b.x2) as i64;
    let iy2 = a.y2.min(b.y2) as i64;

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }

    let intersection = (ix2 - ix1) * (iy2 - iy1);
    let union = a.area() + b.area() - intersection;
    if union <= 0 {
        return 0.0;
    }
    (intersection as f64 / union as f64).clamp(0.0, 1.0)
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// Total length of a polyline through `points`.
pub fn path_length<'a>(points: impl IntoIterator<Item = &'a Point>) -> f64 {
    let mut total = 0.0;
    let mut prev: Option<Point> = None;
    for &p in points {
        if let Some(q) = prev {
            total += distance(q, p);
        }
        prev = Some(p);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_is_symmetric() {
        let boxes = [
            BBox::new(0, 0, 10, 10),
            BBox::new(5, 5, 15, 15),
            BBox::new(-3, 2, 4, 30),
            BBox::new(100, 100, 101, 180),
            BBox::new(7, 7, 7, 20),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(iou(a, b), iou(b, a));
            }
        }
    }

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let a = BBox::new(10, 10, 60, 40);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn disjoint_and_touching_boxes_have_zero_iou() {
        let a = BBox::new(0, 0, 10, 10);
        assert_eq!(iou(&a, &BBox::new(20, 20, 30, 30)), 0.0);
        assert_eq!(iou(&a, &BBox::new(10, 0, 20, 10)), 0.0);
    }

    #[test]
    fn degenerate_boxes_have_zero_area_and_iou() {
        let flat = BBox::new(5, 5, 5, 50);
        let inverted = BBox::new(20, 20, 10, 10);
        assert_eq!(flat.area(), 0);
        assert_eq!(inverted.area(), 0);
        assert_eq!(iou(&flat, &flat), 0.0);
        assert_eq!(iou(&inverted, &BBox::new(0, 0, 30, 30)), 0.0);
    }

    #[test]
    fn partial_overlap() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 0, 15, 10);
        // 50 / (100 + 100 - 50)
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn serializes_as_corner_array() {
        let json = serde_json::to_string(&BBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
    }
}
