use std::path::PathBuf;

/// Errors from canonical encoding and digesting.
///
/// These are defects, never policy outcomes: a value that cannot be
/// serialized, or an artifact that should exist but does not.
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("artifact not readable: {path}: {source}")]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}
