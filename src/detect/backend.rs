use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// What a backend can recognise.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    PersonDetection,
    VehicleDetection,
}

/// Detector backend trait.
///
/// The model behind a backend is opaque to the analytics engine: it is never
/// trained, loaded or tuned here. Only the output contract matters.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame.
    ///
    /// Boxes are in the frame's pixel space. Order is the detector's own and
    /// is preserved downstream.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
