use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};

/// Shared handle to a registered backend.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Named detector backends plus the one preferred by default.
///
/// `detect` takes `&mut self`, so each backend sits behind its own `Mutex`.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend under its own name. The first one becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        self.default_name.get_or_insert_with(|| name.clone());
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("detector backend '{}' is not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// The default backend if it has `capability`, else the first other
    /// backend by name that does.
    pub fn backend_for_capability(
        &self,
        capability: DetectionCapability,
    ) -> Result<SharedBackend> {
        let default = self.default_name.iter().cloned();
        let others = self
            .list()
            .into_iter()
            .filter(|name| self.default_name.as_deref() != Some(name.as_str()));

        for name in default.chain(others) {
            let Some(backend) = self.get(&name) else {
                continue;
            };
            let supported = backend
                .lock()
                .map_err(|_| anyhow!("detector backend '{}' lock poisoned", name))?
                .supports(capability);
            if supported {
                return Ok(backend);
            }
            log::debug!("detector backend '{}' lacks {:?}", name, capability);
        }

        Err(anyhow!(
            "no registered detector backend supports {:?}",
            capability
        ))
    }
}
