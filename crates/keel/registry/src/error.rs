use std::path::PathBuf;

/// Faults raised while loading an operator registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry file not readable: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file is not valid JSON: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry file has unexpected shape: {path}: {detail}")]
    Shape { path: PathBuf, detail: String },
}
