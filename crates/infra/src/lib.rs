//! # Farmgate Infrastructure
//!
//! Process-level wiring for the resilience toolkit.
//!
//! This crate contains:
//! - Configuration loading (files, environment overrides)
//! - Logging initialisation (`tracing` subscriber, rolling files)
//! - [`ResilienceRuntime`], the shared breaker and metric store
//!
//! ## Architecture
//! - Builds on `farmgate-core` and `farmgate-common`
//! - Contains all "impure" code (file system, environment, global subscriber)

pub mod config;
pub mod observability;
pub mod runtime;

// Re-export commonly used items
pub use observability::{init_logging, LoggingGuard};
pub use runtime::ResilienceRuntime;
