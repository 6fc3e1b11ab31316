use std::path::PathBuf;

use keel_canon::CanonError;

/// Errors from the witness subsystem.
#[derive(Debug, thiserror::Error)]
pub enum WitnessError {
    #[error("observer authority violation: {observer} may not {action}")]
    AuthorityViolation { observer: String, action: String },

    #[error("trace sink write failed: {path}: {source}")]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trace sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("canonical encoding failed: {0}")]
    Canon(#[from] CanonError),
}
