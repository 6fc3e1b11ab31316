#![deny(unsafe_code)]
//! # keel-epoch
//!
//! Epoch anchors pin a plan or run to a signed `(epoch_id, root, commit)`
//! triple. Verification is consumed identically by the scheduler and by the
//! runtime's own re-verification pass, always through [`EpochVerifier`].
//!
//! Verification failures are data ([`EpochVerification::errors`]); only an
//! unreadable or malformed anchor file is a fault.

pub mod anchor;
pub mod error;
pub mod verify;

pub use anchor::{load_anchor, sign_anchor, EpochAnchor};
pub use error::EpochError;
pub use verify::{Ed25519EpochVerifier, EpochVerification, EpochVerifier};
