//! Crowd density estimation over person detections.
//!
//! The estimation method is fixed when the analyzer is built. Every method is
//! a pure function of the current frame's people; no state carries across
//! frames.

use anyhow::{anyhow, Result};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use crate::detect::Detection;
use crate::frame::FrameShape;
use crate::geometry::{self, BBox, Point};

/// DBSCAN neighbourhood radius in pixels.
pub const CLUSTER_EPS: f64 = 50.0;
/// DBSCAN core-point threshold, the point itself included.
pub const CLUSTER_MIN_SAMPLES: usize = 2;
/// Radius of the disk stamped per person in the density map.
pub const DENSITY_DISK_RADIUS: i32 = 30;
pub const HOTSPOT_THRESHOLD: f32 = 0.5;
/// Regions must cover more pixels than this to count as a hotspot.
pub const HOTSPOT_MIN_AREA: u64 = 100;

/// Scalar per-pixel crowd field.
pub type DensityField = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdMethod {
    #[default]
    Counting,
    Clustering,
    DensityMap,
}

impl FromStr for CrowdMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "counting" => Ok(CrowdMethod::Counting),
            "clustering" => Ok(CrowdMethod::Clustering),
            "density_map" => Ok(CrowdMethod::DensityMap),
            other => Err(anyhow!(
                "unknown crowd method '{}' (expected counting, clustering or density_map)",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CrowdDensityLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CrowdDensityLevel {
    /// Bucket a people-per-100k-pixel density.
    pub fn from_density(density: f64) -> Self {
        if density < 5.0 {
            CrowdDensityLevel::VeryLow
        } else if density < 20.0 {
            CrowdDensityLevel::Low
        } else if density < 50.0 {
            CrowdDensityLevel::Medium
        } else if density < 100.0 {
            CrowdDensityLevel::High
        } else {
            CrowdDensityLevel::VeryHigh
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountingReport {
    pub total_people: usize,
    /// People per 100 000 pixels.
    pub density_value: f64,
    pub density_level: CrowdDensityLevel,
    pub people_locations: Vec<BBox>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusteringReport {
    pub total_people: usize,
    pub clusters: usize,
    pub avg_cluster_size: f64,
    /// Member count per cluster, in discovery order.
    pub cluster_distribution: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hotspot {
    pub bbox: BBox,
    /// Bounding-box area in pixels.
    pub area: u64,
    /// Field sum inside the bounding box.
    pub density: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DensityMapReport {
    pub total_people: usize,
    pub total_density: f64,
    pub hotspots: Vec<Hotspot>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CrowdReport {
    Counting(CountingReport),
    Clustering(ClusteringReport),
    DensityMap(DensityMapReport),
}

impl CrowdReport {
    pub fn total_people(&self) -> usize {
        match self {
            CrowdReport::Counting(r) => r.total_people,
            CrowdReport::Clustering(r) => r.total_people,
            CrowdReport::DensityMap(r) => r.total_people,
        }
    }

    /// Only the counting method grades density.
    pub fn density_level(&self) -> Option<CrowdDensityLevel> {
        match self {
            CrowdReport::Counting(r) => Some(r.density_level),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CrowdAnalyzer {
    method: CrowdMethod,
}

impl CrowdAnalyzer {
    pub fn new(method: CrowdMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> CrowdMethod {
        self.method
    }

    pub fn analyze(&self, detections: &[Detection], shape: FrameShape) -> CrowdReport {
        let people: Vec<&Detection> = detections.iter().filter(|d| d.is_person()).collect();
        match self.method {
            CrowdMethod::Counting => CrowdReport::Counting(counting(&people, shape)),
            CrowdMethod::Clustering => CrowdReport::Clustering(clustering(&people)),
            CrowdMethod::DensityMap => CrowdReport::DensityMap(density_map(&people, shape)),
        }
    }
}

fn counting(people: &[&Detection], shape: FrameShape) -> CountingReport {
    let frame_area = shape.area();
    let density_value = if frame_area == 0 {
        0.0
    } else {
        people.len() as f64 / frame_area as f64 * 100_000.0
    };
    CountingReport {
        total_people: people.len(),
        density_value,
        density_level: CrowdDensityLevel::from_density(density_value),
        people_locations: people.iter().map(|p| p.bbox).collect(),
    }
}

fn clustering(people: &[&Detection]) -> ClusteringReport {
    let centers: Vec<Point> = people.iter().map(|p| p.bbox.center()).collect();
    let labels = dbscan(&centers, CLUSTER_EPS, CLUSTER_MIN_SAMPLES);

    let clusters = labels.iter().flatten().map(|c| c + 1).max().unwrap_or(0);
    let mut cluster_distribution = vec![0usize; clusters];
    for label in labels.iter().flatten() {
        cluster_distribution[*label] += 1;
    }
    let avg_cluster_size = if clusters == 0 {
        0.0
    } else {
        cluster_distribution.iter().sum::<usize>() as f64 / clusters as f64
    };

    ClusteringReport {
        total_people: people.len(),
        clusters,
        avg_cluster_size,
        cluster_distribution,
    }
}

/// Density-based clustering. Returns a cluster index per point, `None` for
/// noise. Clusters are numbered in discovery order.
pub fn dbscan(points: &[Point], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let neighbours = |i: usize| -> Vec<usize> {
        (0..points.len())
            .filter(|&j| geometry::distance(points[i], points[j]) <= eps)
            .collect()
    };

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0;

    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = neighbours(i);
        if seeds.len() < min_samples {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue: VecDeque<usize> = seeds.into();
        while let Some(j) = queue.pop_front() {
            if !visited[j] {
                visited[j] = true;
                let expansion = neighbours(j);
                if expansion.len() >= min_samples {
                    queue.extend(expansion);
                }
            }
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
        }
    }
    labels
}

/// Stamp a filled disk of value 1 at each person's center. Overlapping disks
/// do not accumulate.
pub fn render_density_map(people: &[&Detection], shape: FrameShape) -> DensityField {
    let mut field = DensityField::new(shape.width, shape.height);
    for person in people {
        let (cx, cy) = person.bbox.center();
        draw_filled_circle_mut(
            &mut field,
            (cx as i32, cy as i32),
            DENSITY_DISK_RADIUS,
            Luma([1.0f32]),
        );
    }
    field
}

fn density_map(people: &[&Detection], shape: FrameShape) -> DensityMapReport {
    if shape.area() == 0 {
        return DensityMapReport {
            total_people: people.len(),
            total_density: 0.0,
            hotspots: Vec::new(),
        };
    }
    let field = render_density_map(people, shape);
    let total_density = field.pixels().map(|p| p.0[0] as f64).sum::<f64>();
    DensityMapReport {
        total_people: people.len(),
        total_density,
        hotspots: find_hotspots(&field),
    }
}

#[derive(Clone, Copy)]
struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
}

/// Connected regions of the thresholded field larger than `HOTSPOT_MIN_AREA`.
pub fn find_hotspots(field: &DensityField) -> Vec<Hotspot> {
    let binary = GrayImage::from_fn(field.width(), field.height(), |x, y| {
        if field.get_pixel(x, y).0[0] > HOTSPOT_THRESHOLD {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut regions: BTreeMap<u32, Region> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .and_modify(|r| {
                r.min_x = r.min_x.min(x);
                r.min_y = r.min_y.min(y);
                r.max_x = r.max_x.max(x);
                r.max_y = r.max_y.max(y);
                r.pixels += 1;
            })
            .or_insert(Region {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                pixels: 1,
            });
    }

    regions
        .values()
        .filter(|r| r.pixels > HOTSPOT_MIN_AREA)
        .map(|r| {
            let w = r.max_x - r.min_x + 1;
            let h = r.max_y - r.min_y + 1;
            let mut density = 0.0f64;
            for y in r.min_y..=r.max_y {
                for x in r.min_x..=r.max_x {
                    density += field.get_pixel(x, y).0[0] as f64;
                }
            }
            Hotspot {
                bbox: BBox::new(
                    r.min_x as i32,
                    r.min_y as i32,
                    (r.min_x + w) as i32,
                    (r.min_y + h) as i32,
                ),
                area: w as u64 * h as u64,
                density,
            }
        })
        .collect()
}
