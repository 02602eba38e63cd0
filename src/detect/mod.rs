mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{ScriptedBackend, StubBackend};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{
    filter_urban_objects, Detection, DEFAULT_TARGET_CLASSES, PARKING_VEHICLE_CLASSES, PERSON_CLASS,
    TRAFFIC_VEHICLE_CLASSES,
};
