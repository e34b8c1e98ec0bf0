//! Bounded fan-out executor.
//!
//! Runs a list of independent work items through a fixed-size worker
//! pool. Each item's success or failure is recorded independently and
//! tagged with the item's input index; nothing downstream may depend on
//! completion order. A failing item never cancels or blocks its
//! siblings.
//!
//! The caller may supply a stopping predicate. Once it returns true, no
//! new items are dispatched, but items already dispatched run to
//! completion and their results are kept.

use std::fmt;
use std::future::Future;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Outcome of one dispatched work item, correlated to its input by
/// `index` (never by position in the returned vector).
#[derive(Debug)]
pub struct WorkOutcome<T, E> {
    /// Index of the originating item in the input list.
    pub index: usize,
    /// Human-readable label for logging and reports.
    pub label: String,
    pub result: Result<T, E>,
}

impl<T, E> WorkOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Executor with a fixed worker bound.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    max_workers: usize,
}

impl FanOutExecutor {
    /// Creates an executor with the given worker bound (clamped to ≥ 1).
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs every item through `worker`, at most `max_workers` at a time.
    ///
    /// Returns one outcome per dispatched item. Items skipped because the
    /// stopping predicate fired before their dispatch produce no outcome.
    pub async fn run<I, T, E, F, Fut>(
        &self,
        items: Vec<(String, I)>,
        worker: F,
        stop: Option<&(dyn Fn() -> bool + Send + Sync)>,
    ) -> Vec<WorkOutcome<T, E>>
    where
        F: Fn(usize, I) -> Fut + Sync,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let semaphore = Semaphore::new(self.max_workers);
        let semaphore = &semaphore;
        let worker = &worker;

        let futures: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, (label, payload))| async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };

                // Dispatch gate: once the predicate fires, in-flight items
                // finish but nothing new starts.
                if let Some(stop) = stop {
                    if stop() {
                        debug!(item = %label, "stopping predicate satisfied, item not dispatched");
                        return None;
                    }
                }

                match worker(index, payload).await {
                    Ok(value) => Some(WorkOutcome {
                        index,
                        label,
                        result: Ok(value),
                    }),
                    Err(e) => {
                        warn!(item = %label, error = %e, "work item failed");
                        Some(WorkOutcome {
                            index,
                            label,
                            result: Err(e),
                        })
                    }
                }
            })
            .collect();

        join_all(futures).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn items(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("item-{i}"), i)).collect()
    }

    #[tokio::test]
    async fn test_all_items_processed() {
        let executor = FanOutExecutor::new(3);
        let outcomes = executor
            .run(
                items(10),
                |_, payload| async move { Ok::<_, String>(payload * 2) },
                None,
            )
            .await;

        assert_eq!(outcomes.len(), 10);
        for outcome in &outcomes {
            let payload = outcome.index;
            assert_eq!(*outcome.result.as_ref().unwrap(), payload * 2);
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let executor = FanOutExecutor::new(4);
        let outcomes = executor
            .run(
                items(8),
                |_, payload| async move {
                    if payload % 2 == 0 {
                        Err(format!("boom {payload}"))
                    } else {
                        Ok(payload)
                    }
                },
                None,
            )
            .await;

        assert_eq!(outcomes.len(), 8);
        let failures: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
        let successes: Vec<_> = outcomes.iter().filter(|o| o.is_success()).collect();
        assert_eq!(failures.len(), 4);
        assert_eq!(successes.len(), 4);
        for failure in failures {
            assert_eq!(failure.index % 2, 0);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = FanOutExecutor::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = executor
            .run(
                items(12),
                |_, _| {
                    let active = Arc::clone(&active);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                },
                None,
            )
            .await;

        assert_eq!(outcomes.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_stopping_predicate_halts_new_dispatch() {
        let executor = FanOutExecutor::new(1);
        let completed = Arc::new(AtomicUsize::new(0));

        let stop_counter = Arc::clone(&completed);
        let stop = move || stop_counter.load(Ordering::SeqCst) >= 3;

        let worker_counter = Arc::clone(&completed);
        let outcomes = executor
            .run(
                items(10),
                |_, payload| {
                    let completed = Arc::clone(&worker_counter);
                    async move {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(payload)
                    }
                },
                Some(&stop),
            )
            .await;

        // With a single worker, dispatch is sequential: exactly three
        // items run before the predicate gates the fourth.
        assert_eq!(outcomes.len(), 3);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_results_tagged_by_index() {
        let executor = FanOutExecutor::new(4);
        let outcomes = executor
            .run(
                items(6),
                |index, _| async move {
                    // Later items finish earlier; tags must still line up.
                    tokio::time::sleep(Duration::from_millis((6 - index) as u64)).await;
                    Ok::<_, String>(index)
                },
                None,
            )
            .await;

        for outcome in outcomes {
            assert_eq!(outcome.index, outcome.result.unwrap());
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let executor = FanOutExecutor::new(4);
        let outcomes = executor
            .run(
                Vec::<(String, ())>::new(),
                |_, _| async move { Ok::<_, String>(()) },
                None,
            )
            .await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_worker_bound_clamped() {
        assert_eq!(FanOutExecutor::new(0).max_workers(), 1);
        assert_eq!(FanOutExecutor::new(8).max_workers(), 8);
    }
}
