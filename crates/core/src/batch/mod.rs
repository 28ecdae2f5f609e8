//! Batch processing
//!
//! [`BatchCoordinator`] runs many independent operations under one breaker
//! key with bounded concurrency, retrying each item and summarising the
//! batch into [`ProcessingMetrics`].

pub mod category;
pub mod coordinator;
pub mod metrics;
pub mod outcome;

pub use category::ErrorCategory;
pub use coordinator::{circuit_breaker_config, retry_options, BatchCoordinator};
pub use metrics::ProcessingMetrics;
pub use outcome::{BatchReport, ItemOutcome};
