#![deny(unsafe_code)]
//! # keel-canon
//!
//! Canonical hashing for the Keel execution kernel.
//!
//! Every content-addressed identifier in the system (`token_id`, `plan_id`,
//! `result_id`, `witness_id`, `dual_proposal_id`, attestations) is derived
//! from a single convention:
//!
//! ```text
//! "sha256:" + hex(sha256(canonical_json(value)))
//! ```
//!
//! where canonical JSON means sorted object keys, no insignificant
//! whitespace and ASCII-only output. External evidence tooling recomputes
//! these digests independently, so the encoding here is an interoperability
//! contract.
//!
//! ## Key Types
//!
//! - [`Digest`]: `sha256:`-prefixed content address
//! - [`canonical_json`] / [`canonical_bytes`]: the canonical encoder
//! - [`digest_of`] / [`digest_bytes`] / [`digest_file`]: digest helpers

pub mod digest;
pub mod error;
pub mod json;

pub use digest::{digest_bytes, digest_file, digest_of, digest_value, Digest, DIGEST_PREFIX};
pub use error::CanonError;
pub use json::{canonical_bytes, canonical_json, canonical_value_string};
