//! Observability for the vApp reconciler.
//!
//! Structured logging via `tracing`, with span helpers for reconcile cycles and
//! per-entity steps.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, TracingConfig};
