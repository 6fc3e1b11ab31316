use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use keel_canon::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EpochError;

/// A signed epoch commitment.
///
/// `public_key` and `signature` are lowercase hex. The signed message is the
/// canonical JSON of `{commit, epoch_id, root}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAnchor {
    pub epoch_id: String,
    pub root: String,
    pub commit: String,
    pub public_key: String,
    pub signature: String,
}

impl EpochAnchor {
    /// The bytes covered by the signature.
    pub fn signed_message(&self) -> Result<Vec<u8>, EpochError> {
        anchor_message(&self.epoch_id, &self.root, &self.commit)
    }
}

pub(crate) fn anchor_message(
    epoch_id: &str,
    root: &str,
    commit: &str,
) -> Result<Vec<u8>, EpochError> {
    let msg = canonical_json(&json!({
        "commit": commit,
        "epoch_id": epoch_id,
        "root": root,
    }))?;
    Ok(msg.into_bytes())
}

/// Read an anchor document from disk.
pub fn load_anchor(path: impl AsRef<Path>) -> Result<EpochAnchor, EpochError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| EpochError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| EpochError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Produce a signed anchor.
pub fn sign_anchor(
    signing_key: &SigningKey,
    epoch_id: &str,
    root: &str,
    commit: &str,
) -> Result<EpochAnchor, EpochError> {
    let message = anchor_message(epoch_id, root, commit)?;
    let signature = signing_key.sign(&message);
    Ok(EpochAnchor {
        epoch_id: epoch_id.to_string(),
        root: root.to_string(),
        commit: commit.to_string(),
        public_key: hex::encode(signing_key.verifying_key().as_bytes()),
        signature: hex::encode(signature.to_bytes()),
    })
}
