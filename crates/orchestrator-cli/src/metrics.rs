//! A small in-process counter of terminal `RetryFinalStatus` outcomes,
//! printed once before exit via `info!(...)` right before the process
//! exits with the final counts.

use std::collections::HashMap;
use std::sync::Mutex;

use orchestrator_core::RetryFinalStatus;

pub struct Counter {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, status: RetryFinalStatus) {
        let label = label_of(status);
        *self.counts.lock().unwrap().entry(label).or_insert(0) += 1;
    }

    /// One-line summary, stable key order, suitable for a final log line.
    pub fn summary(&self) -> String {
        let counts = self.counts.lock().unwrap();
        let mut entries: Vec<(&str, u64)> = counts.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
            .iter()
            .map(|(label, count)| format!("{label}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

fn label_of(status: RetryFinalStatus) -> &'static str {
    match status {
        RetryFinalStatus::Success => "success",
        RetryFinalStatus::Failed => "failed",
        RetryFinalStatus::Timeout => "timeout",
        RetryFinalStatus::TurnLimit => "turn_limit",
        RetryFinalStatus::MaxRetriesExhausted => "max_retries_exhausted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_and_orders_by_label() {
        let counter = Counter::new();
        counter.record(RetryFinalStatus::Success);
        counter.record(RetryFinalStatus::Success);
        counter.record(RetryFinalStatus::Failed);
        assert_eq!(counter.summary(), "failed=1 success=2");
    }
}
