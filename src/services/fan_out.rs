//! Bounded parallel map from symbol tasks to outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::models::extraction::{SymbolOutcome, SymbolTask};
use crate::services::order_extractor::OrderExtractor;

/// Anything that turns one symbol task into one outcome
#[async_trait]
pub trait SymbolWorker: Send + Sync {
    async fn extract(&self, task: &SymbolTask) -> SymbolOutcome;
}

#[async_trait]
impl SymbolWorker for OrderExtractor {
    async fn extract(&self, task: &SymbolTask) -> SymbolOutcome {
        OrderExtractor::extract(self, task).await
    }
}

#[async_trait]
pub trait FanOut: Send + Sync {
    /// Outcome `i` always belongs to task `i`
    async fn run(&self, tasks: Vec<SymbolTask>, concurrency: usize) -> Vec<SymbolOutcome>;
}

/// Runs each task on its own tokio task, at most `concurrency` at a time
#[derive(Clone)]
pub struct LocalFanOut {
    worker: Arc<dyn SymbolWorker>,
}

impl LocalFanOut {
    pub fn new(worker: Arc<dyn SymbolWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl FanOut for LocalFanOut {
    async fn run(&self, tasks: Vec<SymbolTask>, concurrency: usize) -> Vec<SymbolOutcome> {
        let total = tasks.len();
        tracing::info!("Fanning out {} symbols (concurrency {})", total, concurrency.max(1));

        let branches = tasks.into_iter().map(|task| {
            let worker = self.worker.clone();
            let symbol = task.symbol.clone();
            async move {
                let handle = tokio::spawn(async move { worker.extract(&task).await });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("Extraction task for {} aborted: {}", symbol, e);
                        SymbolOutcome::failed(symbol, format!("extraction task aborted: {}", e))
                    }
                }
            }
        });

        let outcomes: Vec<SymbolOutcome> = stream::iter(branches)
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        tracing::info!("Fan-out finished: {} ok, {} failed", total - failed, failed);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps longer for earlier symbols so completion order differs from input order
    #[derive(Default)]
    struct SlowWorker {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SymbolWorker for SlowWorker {
        async fn extract(&self, task: &SymbolTask) -> SymbolOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if task.symbol == "PANIC" {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("worker blew up");
            }

            let rank: u64 = task.symbol.trim_start_matches('S').parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(rank * 5))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            SymbolOutcome::inline(task.symbol.clone(), Vec::new())
        }
    }

    fn tasks(symbols: &[&str]) -> Vec<SymbolTask> {
        symbols
            .iter()
            .map(|s| SymbolTask { symbol: s.to_string(), product_type: None })
            .collect()
    }

    #[tokio::test]
    async fn test_preserves_input_order_and_bounds_concurrency() {
        let worker = Arc::new(SlowWorker::default());
        let fan_out = LocalFanOut::new(worker.clone());

        let symbols = ["S0", "S1", "S2", "S3", "S4", "S5", "S6"];
        let outcomes = fan_out.run(tasks(&symbols), 3).await;

        let returned: Vec<&str> = outcomes.iter().map(|o| o.symbol()).collect();
        assert_eq!(returned, symbols);
        assert!(worker.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicked_branch_becomes_failure() {
        let fan_out = LocalFanOut::new(Arc::new(SlowWorker::default()));

        let outcomes = fan_out.run(tasks(&["S1", "PANIC", "S2"]), 8).await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_failed());
        assert!(!outcomes[2].is_failed());
        match &outcomes[1] {
            SymbolOutcome::Failed { symbol, error } => {
                assert_eq!(symbol, "PANIC");
                assert!(error.contains("aborted"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fan_out = LocalFanOut::new(Arc::new(SlowWorker::default()));
        assert!(fan_out.run(Vec::new(), 0).await.is_empty());
    }
}
