//! Bounded concurrent fan-out across repositories.
//!
//! Every backing call goes through [`FanOut::with_retry`]: a per-call timeout,
//! then exponential backoff with jitter for transient failures. [`FanOut::run`]
//! drives one task per repository with at most `concurrency` in flight and
//! returns once all of them have settled, so callers merge only complete rounds.
//!
//! Failures are reported per repository and never abort the round. Dropping
//! the returned future abandons every in-flight call.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use akidb_core::{CatalogConfig, CoreError, CoreResult, RepositoryId, RetryConfig};

use crate::metrics::{PARTITION_FAILURES, PARTITION_RETRIES};

#[derive(Debug, Clone)]
pub struct FanOut {
    concurrency: usize,
    partition_timeout: Duration,
    retry: RetryConfig,
}

impl FanOut {
    pub fn new(concurrency: usize, partition_timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            concurrency: concurrency.max(1),
            partition_timeout,
            retry,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(
            config.fanout.concurrency,
            config.fanout.partition_timeout(),
            config.retry.clone(),
        )
    }

    /// Runs `task` once per repository and collects every outcome.
    ///
    /// A task may issue several backing calls (a full drain, for instance), so
    /// retries are applied by the task through [`with_retry`](Self::with_retry)
    /// rather than here. Results arrive in completion order. Failed
    /// repositories are logged and counted here; callers decide what an error
    /// means for them.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        repository_ids: Vec<RepositoryId>,
        task: F,
    ) -> Vec<(RepositoryId, CoreResult<T>)>
    where
        F: Fn(RepositoryId) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let task = &task;
        let results: Vec<(RepositoryId, CoreResult<T>)> = stream::iter(repository_ids)
            .map(move |repository_id| async move {
                let result = task(repository_id.clone()).await;
                (repository_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (repository_id, result) in &results {
            if let Err(e) = result {
                PARTITION_FAILURES.with_label_values(&[operation]).inc();
                warn!(
                    repository_id = %repository_id,
                    operation,
                    error = %e,
                    "Repository call failed, treating repository as empty for this request"
                );
            }
        }

        results
    }

    /// Executes one backing call with timeout and retry.
    ///
    /// Only transient errors (`Throttled`, `Timeout`, `Unavailable`) are
    /// retried; anything else is returned immediately.
    pub async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        repository_id: &RepositoryId,
        mut call: F,
    ) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let error = match tokio::time::timeout(self.partition_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => CoreError::Timeout {
                    operation,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            };

            attempt += 1;
            if !error.is_transient() || attempt >= self.retry.max_attempts {
                debug!(
                    repository_id = %repository_id,
                    operation,
                    attempt,
                    error = %error,
                    "Giving up on repository call"
                );
                return Err(error);
            }

            let delay = self.backoff_with_jitter(attempt - 1);
            PARTITION_RETRIES.with_label_values(&[operation]).inc();
            warn!(
                repository_id = %repository_id,
                operation,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Repository call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let delay_ms = self.retry.backoff_for_attempt(attempt).as_millis() as u64;
        let jitter_range = (delay_ms as f64 * self.retry.jitter_percent) as u64;
        let jitter = rand::random::<u64>() % (jitter_range + 1);
        Duration::from_millis(delay_ms + jitter)
    }
}
