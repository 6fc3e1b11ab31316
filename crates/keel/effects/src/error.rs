use std::path::PathBuf;

use keel_canon::CanonError;

/// Faults raised by effect handlers and adapters.
///
/// Policy refusals are never reported here; they come back as a refused
/// [`crate::EffectResult`].
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("{effect_type}: missing argument `{arg}`")]
    MissingArg { effect_type: String, arg: String },

    #[error("{effect_type}: invalid argument `{arg}`: {detail}")]
    InvalidArg {
        effect_type: String,
        arg: String,
        detail: String,
    },

    #[error("{effect_type}: upstream input `{key}` not produced by an earlier step")]
    MissingInput { effect_type: String, key: String },

    #[error("artifact write failed: {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fixture not readable: {path}: {source}")]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fixture malformed: {path}: {detail}")]
    FixtureParse { path: PathBuf, detail: String },

    #[error("adapter misconfigured: {0}")]
    AdapterConfig(String),

    #[error("live transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Canon(#[from] CanonError),
}

impl EffectError {
    pub(crate) fn missing(effect_type: &str, arg: &str) -> Self {
        Self::MissingArg {
            effect_type: effect_type.to_string(),
            arg: arg.to_string(),
        }
    }

    pub(crate) fn invalid(effect_type: &str, arg: &str, detail: impl Into<String>) -> Self {
        Self::InvalidArg {
            effect_type: effect_type.to_string(),
            arg: arg.to_string(),
            detail: detail.into(),
        }
    }
}
