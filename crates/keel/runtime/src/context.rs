use std::path::PathBuf;

use keel_effects::AdapterSettings;
use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;

pub const DEFAULT_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Explicit inputs of one run. The engine reads nothing else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeContext {
    pub timestamp: String,
    /// `None` leaves observer reports on; `Some(vec![])` disables them.
    pub observers: Option<Vec<String>>,
    pub emit_dual_proposal: bool,
    pub enforce_operator_registry: bool,
    pub registry_paths: Vec<PathBuf>,
    pub require_epoch_verification: bool,
    pub epoch_anchor_path: Option<PathBuf>,
    pub epoch_root: Option<String>,
    pub commit_override: Option<String>,
    pub adapters: AdapterSettings,
    pub artifact_dir: Option<PathBuf>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            timestamp: DEFAULT_TIMESTAMP.to_string(),
            observers: None,
            emit_dual_proposal: true,
            enforce_operator_registry: false,
            registry_paths: Vec::new(),
            require_epoch_verification: false,
            epoch_anchor_path: None,
            epoch_root: None,
            commit_override: None,
            adapters: AdapterSettings::default(),
            artifact_dir: None,
        }
    }
}

impl RuntimeContext {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    /// Context for a run configured by `config`, stamped with `timestamp`.
    pub fn from_config(config: &KernelConfig, timestamp: impl Into<String>) -> Self {
        let rt = &config.runtime;
        Self {
            timestamp: timestamp.into(),
            observers: rt.observers.clone(),
            emit_dual_proposal: rt.emit_dual_proposal,
            enforce_operator_registry: rt.enforce_operator_registry,
            registry_paths: rt.registry_paths.clone(),
            require_epoch_verification: rt.require_epoch_verification,
            epoch_anchor_path: rt.epoch_anchor_path.clone(),
            epoch_root: rt.epoch_root.clone(),
            commit_override: rt.commit_override.clone(),
            adapters: config.adapters.settings(),
            artifact_dir: rt.artifact_dir.clone(),
        }
    }

    pub fn with_observers<I, S>(mut self, observers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observers = Some(observers.into_iter().map(Into::into).collect());
        self
    }

    pub fn without_dual_proposal(mut self) -> Self {
        self.emit_dual_proposal = false;
        self
    }

    /// Enforce the operator registry, loading `paths` unless the engine has
    /// an injected source.
    pub fn with_registry<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.enforce_operator_registry = true;
        self.registry_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_epoch_anchor(mut self, path: impl Into<PathBuf>, root: impl Into<String>) -> Self {
        self.require_epoch_verification = true;
        self.epoch_anchor_path = Some(path.into());
        self.epoch_root = Some(root.into());
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterSettings) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }
}
