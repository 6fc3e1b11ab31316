#![deny(unsafe_code)]
//! # keel-effects
//!
//! The unit of planned work ([`EffectStep`]), its outcome ([`EffectResult`])
//! and the handler table that turns one into the other.
//!
//! The [`HandlerRegistry`] is constructed by the caller and passed to the
//! runtime engine; there is no process-wide table. Unregistered effect types
//! run as no-ops.
//!
//! Handlers are deterministic for identical arguments and referenced file
//! contents. Every artifact they read or write contributes its digest to the
//! result. Emitted artifacts are redacted before they are serialized, and latency
//! is only ever reported as a bucket label.
//!
//! ## Built-in families
//!
//! | Family | Effect types |
//! |---|---|
//! | generic | `NOOP`, `EMIT_ARTIFACT`, `ARTIFACT_DIGEST`, `TERM_APPLY`, `LOWER_BACKEND` |
//! | IO lane | `IO_CONNECT` .. `IO_ROLLBACK` |
//! | NET lane | `NET_CONNECT` .. `NET_ROLLBACK` |
//! | delta-S | `DELTA_S_COMPUTE`, `COLLAPSE_COMMIT` |
//! | operator | `OPERATOR_INVOKE` |
//! | trading | `TRADING_SIGNAL`, `TRADING_FILL`, `TRADING_RISK`, `TRADING_REPORT` |
//! | PDE | `PDE_EVOLVE`, `PDE_PROJECT`, `PDE_BARRIER_CHECK` |

pub mod adapter;
pub mod context;
pub mod error;
pub mod handlers;
pub mod redact;
pub mod registry;
pub mod step;

pub use adapter::{
    AdapterKind, AdapterOutcome, AdapterSettings, LaneAdapter, LaneOp, LaneRequest, LiveTransport,
};
pub use context::{latency_bucket, DeltaSEvidence, EffectContext};
pub use error::EffectError;
pub use redact::{redact_value, REDACTED};
pub use registry::{EffectHandler, HandlerRegistry, NoopHandler};
pub use step::{CostModel, EffectResult, EffectStep, Requires};
