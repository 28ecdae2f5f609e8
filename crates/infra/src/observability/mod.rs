//! Observability setup for host processes
//!
//! Structured logging through `tracing`. Metric storage itself lives in
//! `farmgate_common::metrics` and is owned by
//! [`ResilienceRuntime`](crate::runtime::ResilienceRuntime).

pub mod logging;

pub use logging::{init_logging, LoggingGuard};
