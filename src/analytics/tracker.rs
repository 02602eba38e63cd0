//! Greedy IoU pedestrian tracker and flow statistics.
//!
//! Matching is per detection against the track table as it stood before the
//! current `update` call. It is neither globally optimal nor mutually
//! exclusive: two detections in one batch may claim the same prior track, in
//! which case both centers are appended to its trajectory and the later
//! detection's box wins in the returned map.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::detect::Detection;
use crate::geometry::{self, BBox, Point};

pub const DEFAULT_MAX_AGE: u32 = 30;
pub const MAX_TRAJECTORY_LEN: usize = 50;
pub const MATCH_IOU_THRESHOLD: f64 = 0.3;

pub type TrackId = u64;

/// Bounded FIFO of recent centers. The oldest point is evicted when a point
/// is appended at capacity.
#[derive(Clone, Debug)]
pub struct Trajectory {
    points: VecDeque<Point>,
    capacity: usize,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<Point> {
        self.points.iter().copied().collect()
    }
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::with_capacity(MAX_TRAJECTORY_LEN)
    }
}

/// Snapshot of one track as returned by `Tracker::update`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub bbox: BBox,
    pub center: Point,
    /// Consecutive updates without a match.
    pub age: u32,
    /// Oldest first, at most `MAX_TRAJECTORY_LEN` points.
    pub trajectory: Vec<Point>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Bucket a heading in degrees, `[0, 360)`, image coordinates (y down).
    pub fn from_angle(angle: f64) -> Self {
        if (45.0..135.0).contains(&angle) {
            Direction::Down
        } else if (135.0..225.0).contains(&angle) {
            Direction::Left
        } else if (225.0..315.0).contains(&angle) {
            Direction::Up
        } else {
            Direction::Right
        }
    }

    /// Heading from `start` to `end`.
    pub fn between(start: Point, end: Point) -> Self {
        let mut angle = (end.1 - start.1).atan2(end.0 - start.0).to_degrees();
        if angle < 0.0 {
            angle += 360.0;
        }
        Self::from_angle(angle)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovementPattern {
    pub direction: Direction,
    /// Mean displacement per trajectory sample, in pixels.
    pub speed: f64,
    pub distance_traveled: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowReport {
    pub total_pedestrians: usize,
    pub movement_patterns: BTreeMap<TrackId, MovementPattern>,
    pub average_speed: f64,
}

#[derive(Debug)]
pub struct Tracker {
    max_age: u32,
    next_id: TrackId,
    tracks: BTreeMap<TrackId, Track>,
    trajectories: HashMap<TrackId, Trajectory>,
}

impl Tracker {
    pub fn new(max_age: u32) -> Self {
        Self {
            max_age,
            next_id: 0,
            tracks: BTreeMap::new(),
            trajectories: HashMap::new(),
        }
    }

    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    /// All live tracks, including ones currently unmatched.
    pub fn tracks(&self) -> &BTreeMap<TrackId, Track> {
        &self.tracks
    }

    /// Feed one frame of detections. Returns the tracks matched or created
    /// by this call, keyed by id.
    pub fn update(&mut self, detections: &[Detection]) -> BTreeMap<TrackId, Track> {
        let mut current: BTreeMap<TrackId, Track> = BTreeMap::new();

        for detection in detections.iter().filter(|d| d.is_person()) {
            let id = self.assign_track_id(&detection.bbox);
            let center = detection.bbox.center();
            let trajectory = self.trajectories.entry(id).or_default();
            trajectory.push(center);

            current.insert(
                id,
                Track {
                    id,
                    bbox: detection.bbox,
                    center,
                    age: 0,
                    trajectory: trajectory.to_vec(),
                },
            );
        }

        self.age_and_evict(&current);
        current
    }

    /// Best prior track by IoU above the threshold, else a fresh id.
    ///
    /// `self.tracks` is only written in `age_and_evict`, so every detection
    /// in a batch searches the same snapshot.
    fn assign_track_id(&mut self, bbox: &BBox) -> TrackId {
        let mut best: Option<TrackId> = None;
        let mut best_iou = MATCH_IOU_THRESHOLD;
        for (id, track) in &self.tracks {
            let iou = geometry::iou(&track.bbox, bbox);
            if iou > best_iou {
                best_iou = iou;
                best = Some(*id);
            }
        }
        best.unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        })
    }

    fn age_and_evict(&mut self, current: &BTreeMap<TrackId, Track>) {
        let max_age = self.max_age;
        let mut evicted = Vec::new();
        for (id, track) in self.tracks.iter_mut() {
            if current.contains_key(id) {
                continue;
            }
            track.age += 1;
            if track.age > max_age {
                evicted.push(*id);
            }
        }
        for id in evicted {
            self.tracks.remove(&id);
            self.trajectories.remove(&id);
            log::debug!("track {} evicted after {} missed frames", id, max_age + 1);
        }
        for (id, track) in current {
            self.tracks.insert(*id, track.clone());
        }
    }

    /// Direction and speed for every track with at least two points.
    pub fn analyze_flow(&self, tracks: &BTreeMap<TrackId, Track>) -> FlowReport {
        analyze_flow(tracks)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

pub fn analyze_flow(tracks: &BTreeMap<TrackId, Track>) -> FlowReport {
    let mut movement_patterns = BTreeMap::new();
    for (id, track) in tracks {
        let (Some(&start), Some(&end)) = (track.trajectory.first(), track.trajectory.last()) else {
            continue;
        };
        if track.trajectory.len() < 2 {
            continue;
        }
        let distance_traveled = geometry::path_length(&track.trajectory);
        movement_patterns.insert(
            *id,
            MovementPattern {
                direction: Direction::between(start, end),
                speed: distance_traveled / track.trajectory.len() as f64,
                distance_traveled,
            },
        );
    }

    let average_speed = if movement_patterns.is_empty() {
        0.0
    } else {
        movement_patterns.values().map(|p| p.speed).sum::<f64>() / movement_patterns.len() as f64
    };

    FlowReport {
        total_pedestrians: tracks.len(),
        movement_patterns,
        average_speed,
    }
}
