//! Scene analytics over per-frame detections.
//!
//! - `tracker`: IoU tracking of people and pedestrian flow
//! - `traffic`: vehicle counts, density and congestion
//! - `crowd`: people counting, clustering and density maps
//! - `parking`: spot generation and occupancy

pub mod crowd;
pub mod parking;
pub mod tracker;
pub mod traffic;

pub use crowd::{CrowdAnalyzer, CrowdDensityLevel, CrowdMethod, CrowdReport};
pub use parking::{ParkingAnalyzer, ParkingReport, ParkingSpot, SpotMethod};
pub use tracker::{Direction, FlowReport, MovementPattern, Track, TrackId, Tracker};
pub use traffic::{CongestionLevel, TrafficAnalyzer, TrafficReport};
