//! # Farmgate Core
//!
//! Batch orchestration on top of the shared resilience primitives.
//!
//! ## Architecture Principles
//! - Depends on `farmgate-common` and `farmgate-domain` only
//! - No configuration loading, logging setup or global state
//! - Shared breaker and metric store are injected as `Arc`s

pub mod batch;

pub use batch::{
    BatchCoordinator, BatchReport, ErrorCategory, ItemOutcome, ProcessingMetrics,
};
