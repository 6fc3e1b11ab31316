#![deny(unsafe_code)]
//! # keel-registry
//!
//! Operator registries name the canonical operators a program may reference.
//! The planner and the runtime consume them through [`RegistrySource`]; the
//! JSON file loader here is the implementation used in practice.
//!
//! Unreadable or malformed files are faults. Entries that parse but cannot
//! be admitted (no id, conflicting duplicates) are policy findings and land
//! in [`LoadedRegistry::errors`].

pub mod error;
pub mod loader;

pub use error::RegistryError;
pub use loader::{JsonRegistryLoader, LoadedRegistry, RegistrySource, StaticRegistry};
