//! Per-item and per-batch results

use std::time::Duration;

use farmgate_common::resilience::ResilienceResult;

use super::metrics::ProcessingMetrics;

/// Completion record for one item, emitted in completion order
#[derive(Debug)]
pub struct ItemOutcome<O, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Position of the item in the input
    pub index: usize,
    pub result: ResilienceResult<O, E>,
    /// Wall time from admission check to final outcome
    pub latency: Duration,
    /// Operation invocations; `0` when the circuit was open
    pub attempts: u32,
}

impl<O, E> ItemOutcome<O, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of a batch in input order plus its summary
#[derive(Debug)]
pub struct BatchReport<O, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// One entry per input item, at the item's position
    pub results: Vec<ResilienceResult<O, E>>,
    pub metrics: ProcessingMetrics,
}

impl<O, E> BatchReport<O, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Positions of the items that failed
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(index, result)| result.is_err().then_some(index))
            .collect()
    }

    /// Successful values with their positions
    pub fn successes(&self) -> impl Iterator<Item = (usize, &O)> + '_ {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(index, result)| result.as_ref().ok().map(|value| (index, value)))
    }
}
