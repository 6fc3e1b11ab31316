//! Kernel configuration, layered from defaults, an optional file and `KEEL_*`
//! environment variables.

use std::path::{Path, PathBuf};

use keel_effects::{AdapterKind, AdapterSettings};
use serde::{Deserialize, Serialize};

/// Environment variable prefix; nested keys use `__`
/// (`KEEL_ADAPTERS__LIVE_READY=true`).
pub const ENV_PREFIX: &str = "KEEL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub trace: TraceConfig,

    #[serde(default)]
    pub adapters: AdapterConfig,

    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: default_filter(),
            ansi: false,
        }
    }
}

/// Where witness records are mirrored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// JSON-lines file; no file sink when unset
    #[serde(default)]
    pub sink_path: Option<PathBuf>,
}

/// Lane adapter selection. Both lanes default to dry-run and live adapters
/// stay closed until `live_ready` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub io_adapter: AdapterKind,

    #[serde(default)]
    pub net_adapter: AdapterKind,

    #[serde(default)]
    pub fixture_path: Option<PathBuf>,

    #[serde(default)]
    pub live_ready: bool,
}

impl AdapterConfig {
    pub fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            io: self.io_adapter,
            net: self.net_adapter,
            fixture_path: self.fixture_path.clone(),
            live_ready: self.live_ready,
        }
    }
}

/// Runtime behaviour toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// `None` keeps observer reports on; an empty list turns them off
    #[serde(default)]
    pub observers: Option<Vec<String>>,

    #[serde(default = "default_true")]
    pub emit_dual_proposal: bool,

    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    #[serde(default)]
    pub enforce_operator_registry: bool,

    #[serde(default)]
    pub registry_paths: Vec<PathBuf>,

    #[serde(default)]
    pub require_epoch_verification: bool,

    #[serde(default)]
    pub epoch_anchor_path: Option<PathBuf>,

    #[serde(default)]
    pub epoch_root: Option<String>,

    #[serde(default)]
    pub commit_override: Option<String>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            observers: None,
            emit_dual_proposal: true,
            artifact_dir: None,
            enforce_operator_registry: false,
            registry_paths: Vec::new(),
            require_epoch_verification: false,
            epoch_anchor_path: None,
            epoch_root: None,
            commit_override: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl KernelConfig {
    /// Load configuration: defaults, then `path` (format by extension, must
    /// exist when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&KernelConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
