use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::CanonError;
use crate::json::canonical_bytes;

/// Prefix carried by every content address.
pub const DIGEST_PREFIX: &str = "sha256:";

/// A `sha256:<hex>` content address.
///
/// Serialized as the plain prefixed string so persisted documents stay
/// readable by tooling that knows nothing about this type.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Hash raw bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(format!("{}{}", DIGEST_PREFIX, hex::encode(Sha256::digest(data))))
    }

    /// Parse and validate a prefixed digest string.
    pub fn parse(s: &str) -> Result<Self, CanonError> {
        let hex_part = s
            .strip_prefix(DIGEST_PREFIX)
            .ok_or_else(|| CanonError::InvalidDigest(s.to_string()))?;
        if hex_part.len() != 64
            || !hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(CanonError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex part without the `sha256:` prefix.
    pub fn hex(&self) -> &str {
        self.0.strip_prefix(DIGEST_PREFIX).unwrap_or(&self.0)
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        let hex = self.hex();
        &hex[..hex.len().min(12)]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// Digest of raw bytes.
pub fn digest_bytes(data: &[u8]) -> Digest {
    Digest::of_bytes(data)
}

/// Digest of the canonical JSON encoding of a value.
pub fn digest_of<T: Serialize + ?Sized>(value: &T) -> Result<Digest, CanonError> {
    Ok(Digest::of_bytes(&canonical_bytes(value)?))
}

/// Digest of an already-built JSON value. Infallible.
pub fn digest_value(value: &serde_json::Value) -> Digest {
    Digest::of_bytes(crate::json::canonical_value_string(value).as_bytes())
}

/// Digest of a file's contents. A missing or unreadable file is a defect.
pub fn digest_file(path: impl AsRef<Path>) -> Result<Digest, CanonError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| CanonError::ArtifactRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Digest::of_bytes(&bytes))
}
