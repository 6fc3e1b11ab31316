use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anchor::EpochAnchor;

/// Outcome of checking an anchor. Failures are reasons, not faults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochVerification {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl EpochVerification {
    pub fn passed() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

/// Checks an anchor against an expected root and optional commit.
pub trait EpochVerifier: Send + Sync {
    fn verify(
        &self,
        anchor: &EpochAnchor,
        root: Option<&str>,
        commit_override: Option<&str>,
    ) -> EpochVerification;
}

/// Ed25519 signature verifier over canonical anchor messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519EpochVerifier;

impl Ed25519EpochVerifier {
    fn check_signature(anchor: &EpochAnchor) -> Result<(), String> {
        let key_bytes: [u8; 32] = hex::decode(&anchor.public_key)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| "public key is not 32 hex-encoded bytes".to_string())?;
        let sig_bytes: [u8; 64] = hex::decode(&anchor.signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| "signature is not 64 hex-encoded bytes".to_string())?;

        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| format!("public key rejected: {e}"))?;
        let signature = Signature::from_bytes(&sig_bytes);
        let message = anchor
            .signed_message()
            .map_err(|e| format!("anchor message unavailable: {e}"))?;
        key.verify(&message, &signature)
            .map_err(|_| "signature does not verify".to_string())
    }
}

impl EpochVerifier for Ed25519EpochVerifier {
    fn verify(
        &self,
        anchor: &EpochAnchor,
        root: Option<&str>,
        commit_override: Option<&str>,
    ) -> EpochVerification {
        let mut errors = Vec::new();

        if let Some(expected) = root {
            if anchor.root != expected {
                errors.push(format!(
                    "root mismatch: expected {expected}, got {}",
                    anchor.root
                ));
            }
        }
        if let Some(expected) = commit_override {
            if anchor.commit != expected {
                errors.push(format!(
                    "commit mismatch: expected {expected}, got {}",
                    anchor.commit
                ));
            }
        }
        if let Err(e) = Self::check_signature(anchor) {
            errors.push(e);
        }

        debug!(epoch_id = %anchor.epoch_id, errors = errors.len(), "Epoch anchor checked");
        if errors.is_empty() {
            EpochVerification::passed()
        } else {
            EpochVerification::failed(errors)
        }
    }
}
