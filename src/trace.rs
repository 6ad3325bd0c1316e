//! Feature-gated tracing re-exports.
//!
//! With the `tracing` feature enabled this re-exports the macros the crate
//! instruments with; every call site is `#[cfg(feature = "tracing")]`-gated,
//! so the default build carries no instrumentation at all.

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, trace};
