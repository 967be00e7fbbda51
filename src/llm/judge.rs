//! Bounded-concurrency LLM-as-judge fan-out, shared by P2b's quality-gate
//! scorers and P5b's confidence-calibration scorers (spec.md §4.3/§4.7,
//! §5: "M concurrent LLM judge calls (M ≤ 4)").

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Runs `jobs` concurrently with at most `concurrency` in flight at once,
/// returning results in the same order as `jobs`. A job that panics or is
/// cancelled contributes `None` to the result vector rather than aborting
/// the whole batch, so one flaky judge call degrades gracefully.
pub struct ParallelScorer {
    concurrency: usize,
}

impl ParallelScorer {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1) }
    }

    /// `cancel` is raced against every in-flight job (spec.md §5: a client
    /// disconnect cancels pending LLM futures within one round-trip, not
    /// just at the next phase boundary). Checked up front each iteration,
    /// not only via `changed()`, so a cancellation that already happened
    /// before this receiver was cloned is still honored.
    pub async fn run<F, Fut, T>(&self, jobs: Vec<F>, mut cancel: watch::Receiver<bool>) -> Vec<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                (index, job().await)
            });
        }

        let mut results: Vec<Option<T>> = Vec::new();
        let mut slots: std::collections::HashMap<usize, T> = std::collections::HashMap::new();
        let mut max_index = 0usize;
        loop {
            if *cancel.borrow() {
                set.abort_all();
                break;
            }
            tokio::select! {
                joined = set.join_next() => {
                    match joined {
                        Some(Ok((index, value))) => {
                            max_index = max_index.max(index + 1);
                            slots.insert(index, value);
                        },
                        Some(Err(_)) => {},
                        None => break,
                    }
                },
                _ = cancel.changed() => {},
            }
        }
        results.resize_with(max_index, || None);
        for (index, value) in slots {
            results[index] = Some(value);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_all_jobs_and_preserves_order() {
        let scorer = ParallelScorer::new(2);
        let jobs: Vec<_> = (0..5).map(|i| move || async move { i * 10 }).collect();
        let (_tx, rx) = watch::channel(false);
        let results = scorer.run(jobs, rx).await;
        assert_eq!(results, vec![Some(0), Some(10), Some(20), Some(30), Some(40)]);
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let scorer = ParallelScorer::new(2);

        let jobs: Vec<_> = (0..6)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                move || async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        let (_tx, rx) = watch::channel(false);
        scorer.run(jobs, rx).await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn already_cancelled_receiver_short_circuits() {
        let scorer = ParallelScorer::new(2);
        let jobs: Vec<_> = (0..4)
            .map(|i| move || async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                i
            })
            .collect();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let results = scorer.run(jobs, rx).await;
        assert!(results.iter().all(|r| r.is_none()));
    }
}
