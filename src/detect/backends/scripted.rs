use anyhow::{anyhow, Result};
use std::path::Path;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Replays precomputed detections keyed by frame index.
///
/// Entry `i` of the script belongs to the frame with `index == i`, so frames
/// dropped by the pipeline simply skip their entries. Past the end of the
/// script the backend either wraps around (`looping`) or returns empty lists.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    looping: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            looping: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Load a JSON array of per-frame detection arrays.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let script: Vec<Vec<Detection>> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        log::info!(
            "ScriptedBackend: loaded {} frames of detections from {}",
            script.len(),
            path.display()
        );
        Ok(Self::new(script))
    }

    /// Number of scripted frames.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    fn entry_for(&self, index: u64) -> Option<&Vec<Detection>> {
        let len = self.script.len() as u64;
        if len == 0 {
            return None;
        }
        let slot = if self.looping { index % len } else { index };
        usize::try_from(slot).ok().and_then(|i| self.script.get(i))
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::PersonDetection | DetectionCapability::VehicleDetection
        )
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.entry_for(frame.index).cloned().unwrap_or_default())
    }
}
