//! Per-batch processing summary

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use farmgate_common::duration_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::category::ErrorCategory;
use super::outcome::ItemOutcome;

/// Aggregate outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub batch_id: Uuid,
    /// Every item in the batch, short-circuited ones included
    pub total_processed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// `success_count / total_processed`; `0.0` for an empty batch
    pub success_rate: f64,
    /// Mean per-item latency
    #[serde(with = "duration_millis")]
    pub average_processing_time: Duration,
    pub error_categories: BTreeMap<ErrorCategory, usize>,
    pub completed_at: DateTime<Utc>,
}

impl ProcessingMetrics {
    /// Summarise item outcomes
    pub fn from_outcomes<O, E>(
        batch_id: Uuid,
        outcomes: &[ItemOutcome<O, E>],
        completed_at: DateTime<Utc>,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let total_processed = outcomes.len();
        let mut error_categories = BTreeMap::new();
        let mut success_count = 0;
        let mut total_latency = Duration::ZERO;

        for outcome in outcomes {
            total_latency += outcome.latency;
            match &outcome.result {
                Ok(_) => success_count += 1,
                Err(err) => *error_categories.entry(ErrorCategory::of(err)).or_insert(0) += 1,
            }
        }

        let (success_rate, average_processing_time) = if total_processed == 0 {
            (0.0, Duration::ZERO)
        } else {
            let divisor = u32::try_from(total_processed).unwrap_or(u32::MAX);
            (success_count as f64 / total_processed as f64, total_latency / divisor)
        };

        Self {
            batch_id,
            total_processed,
            success_count,
            failure_count: total_processed - success_count,
            success_rate,
            average_processing_time,
            error_categories,
            completed_at,
        }
    }

    /// Failures in `category`
    pub fn errors_in(&self, category: ErrorCategory) -> usize {
        self.error_categories.get(&category).copied().unwrap_or(0)
    }
}
