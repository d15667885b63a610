use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::result::Detection;
use crate::frame::Frame;

use super::backend::DetectorBackend;

/// Registry of detector backends, keyed by backend name.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build the registry described by the detector settings.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        match settings.backend.as_str() {
            "scripted" => {
                let backend = match &settings.script_path {
                    Some(path) => super::ScriptedBackend::from_path(path)?,
                    None => super::ScriptedBackend::new(Vec::new()),
                };
                registry.register(backend.with_labels(settings.labels.iter().cloned()));
            }
            #[cfg(feature = "backend-tract")]
            "tract" => {
                let model_path = settings
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("tract detector requires model_path"))?;
                let backend = super::TractBackend::new(
                    model_path,
                    settings.labels.clone(),
                    settings.input_size,
                )?
                .with_threshold(settings.confidence_threshold);
                registry.register(backend);
            }
            #[cfg(not(feature = "backend-tract"))]
            "tract" => {
                return Err(anyhow!(
                    "detector backend 'tract' requires the backend-tract feature"
                ))
            }
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Name of the first registered backend, preferred for every label it emits.
    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Name of a backend that can emit `label`.
    ///
    /// Prefers the default backend when it supports the label.
    pub fn backend_for_label(&self, label: &str) -> Result<String> {
        if let Some(name) = &self.default_name {
            if self
                .backends
                .get(name)
                .is_some_and(|b| b.supports_label(label))
            {
                return Ok(name.clone());
            }
        }

        self.list()
            .into_iter()
            .find(|name| self.backends[name].supports_label(label))
            .ok_or_else(|| anyhow!("no registered backend emits label '{}'", label))
    }

    /// Run detection with the backend chosen for `label`.
    pub fn detect_for_label(&mut self, label: &str, frame: &Frame) -> Result<Vec<Detection>> {
        let name = self.backend_for_label(label)?;
        let backend = self
            .backends
            .get_mut(&name)
            .ok_or_else(|| anyhow!("backend '{}' disappeared", name))?;
        backend.detect(frame)
    }

    /// Run every backend's warm-up hook.
    pub fn warm_up(&mut self) -> Result<()> {
        for (name, backend) in self.backends.iter_mut() {
            backend
                .warm_up()
                .map_err(|e| anyhow!("warm-up failed for backend '{}': {}", name, e))?;
        }
        Ok(())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
