//! Concurrent fan-out of independent retrieval tasks
//!
//! Tasks run on a `JoinSet` bounded by a semaphore that lives only for the
//! duration of one [`FanOut::run`] call. Every task gets its own timeout and
//! its own error slot: one broken collection never aborts the batch.

use futures::future::BoxFuture;
use futures::FutureExt;
use lexforge_common::config::RetrievalConfig;
use lexforge_common::errors::{AppError, Result};
use lexforge_common::metrics;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A labelled unit of work. `Ok(None)` means "ran fine, nothing to report".
pub struct FanOutTask<T> {
    pub label: String,
    pub future: BoxFuture<'static, Result<Option<T>>>,
}

impl<T> FanOutTask<T> {
    pub fn new<F>(label: impl Into<String>, future: F) -> Self
    where
        F: std::future::Future<Output = Result<Option<T>>> + Send + 'static,
    {
        Self {
            label: label.into(),
            future: future.boxed(),
        }
    }
}

/// A task that errored, timed out or panicked
#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub label: String,
    pub error: AppError,
}

/// Outcome of one fan-out call
#[derive(Debug)]
pub struct FanOutReport<T> {
    /// Successful outputs in submission order
    pub successes: Vec<T>,
    /// Failures in submission order
    pub failures: Vec<TaskFailure>,
    /// Tasks that succeeded without output
    pub empty: usize,
}

impl<T> FanOutReport<T> {
    /// Total tasks run
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len() + self.empty
    }

    /// True when no task produced output and at least one failed
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty() && self.successes.is_empty()
    }

    /// Successes, or `AllTasksFailed` when no task succeeded and at least one failed
    pub fn into_result(self, operation: &str) -> Result<Vec<T>> {
        if self.all_failed() {
            let failed = self.failures.len();
            let last_error = self
                .failures
                .last()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            return Err(AppError::AllTasksFailed {
                operation: operation.to_string(),
                failed,
                last_error,
            });
        }
        Ok(self.successes)
    }
}

/// Bounded concurrent executor
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    max_concurrency: usize,
    task_timeout: Duration,
}

impl FanOut {
    pub fn new(max_concurrency: usize, task_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            task_timeout,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_concurrency, Duration::from_secs(config.task_timeout_secs))
    }

    /// Run every task and partition the outcomes
    pub async fn run<T: Send + 'static>(&self, operation: &str, tasks: Vec<FanOutTask<T>>) -> FanOutReport<T> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let timeout = self.task_timeout;
        let mut set = JoinSet::new();
        let mut labels = Vec::with_capacity(total);

        for (index, task) in tasks.into_iter().enumerate() {
            labels.push(task.label.clone());
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let guarded = AssertUnwindSafe(task.future).catch_unwind();
                        match tokio::time::timeout(timeout, guarded).await {
                            Ok(Ok(result)) => result,
                            Ok(Err(_)) => Err(AppError::Internal {
                                message: format!("task {} panicked", task.label),
                            }),
                            Err(_) => Err(AppError::TaskTimeout {
                                task: task.label.clone(),
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        }
                    }
                    Err(_) => Err(AppError::Internal {
                        message: "fan-out semaphore closed".to_string(),
                    }),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Option<T>>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = ?e, "Fan-out task aborted"),
            }
        }

        let mut report = FanOutReport {
            successes: Vec::new(),
            failures: Vec::new(),
            empty: 0,
        };
        for (index, slot) in slots.into_iter().enumerate() {
            let label = std::mem::take(&mut labels[index]);
            match slot {
                Some(Ok(Some(value))) => report.successes.push(value),
                Some(Ok(None)) => report.empty += 1,
                Some(Err(error)) => {
                    tracing::warn!(
                        task = %label,
                        code = ?error.code(),
                        transient = error.is_transient(),
                        error = %error,
                        "Fan-out task failed"
                    );
                    report.failures.push(TaskFailure { index, label, error });
                }
                None => report.failures.push(TaskFailure {
                    index,
                    error: AppError::Internal {
                        message: format!("task {} did not complete", label),
                    },
                    label,
                }),
            }
        }

        metrics::record_fanout(operation, report.successes.len(), report.failures.len());
        if report.all_failed() {
            tracing::warn!(operation = operation, tasks = total, "All fan-out tasks failed");
        } else {
            tracing::debug!(
                operation = operation,
                succeeded = report.successes.len(),
                failed = report.failures.len(),
                "Fan-out completed"
            );
        }
        report
    }
}
