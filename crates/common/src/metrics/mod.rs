//! In-memory metric time series
//!
//! [`MetricStore`] keeps one bounded series of `(Instant, f64)` samples per
//! metric name plus a map of free-form JSON custom metrics. Statistics are
//! computed on demand.

pub mod stats;
pub mod store;

pub use stats::{percentile, MetricStats};
pub use store::{MetricStore, MetricStoreConfig, Sample};
