//! Independent execution of many tasks.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::output::derive_output_path;
use crate::task::Task;
use crate::types::{TaskConfig, TaskReport};
use crate::{FailureKind, TransferError};

/// Batch-level knobs, separate from per-task tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Upper bound on tasks running at once. `None` runs every task at once.
    pub max_concurrent_tasks: Option<usize>,
    /// Delete each output after it verified successfully.
    pub remove_outputs: bool,
}

/// Result of one task in a batch.
#[derive(Debug)]
pub struct TaskOutcome {
    pub source: PathBuf,
    pub result: Result<TaskReport, TransferError>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.result.as_ref().err().map(TransferError::kind)
    }
}

/// Aggregate counts for a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[TaskOutcome], elapsed_ms: u128) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            succeeded,
            failed: outcomes.len() - succeeded,
            elapsed_ms,
        }
    }
}

/// Runs one task per source. Tasks share nothing; a failure in one never
/// affects the others.
///
/// Outcomes are returned in the order of `sources`.
pub async fn run_batch(
    sources: Vec<PathBuf>,
    config: TaskConfig,
    options: BatchOptions,
) -> Vec<TaskOutcome> {
    let started = Instant::now();
    let limiter = match options.max_concurrent_tasks {
        Some(0) => {
            warn!("max_concurrent_tasks of 0 ignored, running with a limit of 1");
            Some(Arc::new(Semaphore::new(1)))
        }
        Some(limit) => Some(Arc::new(Semaphore::new(limit))),
        None => None,
    };

    let mut results: Vec<Option<Result<TaskReport, TransferError>>> =
        (0..sources.len()).map(|_| None).collect();
    for (index, conflict) in output_conflicts(&sources, &config) {
        log_failure(&sources[index], &conflict);
        results[index] = Some(Err(conflict));
    }

    let mut tasks = JoinSet::new();
    for (index, source) in sources.iter().cloned().enumerate() {
        if results[index].is_some() {
            continue;
        }
        let config = config.clone();
        let limiter = limiter.clone();
        let remove_output = options.remove_outputs;
        tasks.spawn(async move {
            let _permit = match limiter {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        return (index, Err(TransferError::Join("limiter closed".into())));
                    }
                },
                None => None,
            };
            (index, run_one(source, config, remove_output).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "batch task panicked"),
        }
    }

    let outcomes: Vec<TaskOutcome> = sources
        .into_iter()
        .zip(results)
        .map(|(source, result)| TaskOutcome {
            source,
            result: result
                .unwrap_or_else(|| Err(TransferError::Join("task did not report".into()))),
        })
        .collect();

    let summary = BatchSummary::from_outcomes(&outcomes, started.elapsed().as_millis());
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_ms = summary.elapsed_ms as u64,
        "batch finished"
    );
    outcomes
}

/// Finds tasks that would write where another task of the batch writes or
/// reads.
///
/// The first source claiming an output keeps it; every later claimant fails.
/// A task whose output is another task's source fails as well. Sources whose
/// output cannot be derived are left to [`Task::new`] to reject.
fn output_conflicts(sources: &[PathBuf], config: &TaskConfig) -> Vec<(usize, TransferError)> {
    let inputs: HashSet<PathBuf> = sources.iter().map(|s| comparable(s)).collect();
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut conflicts = Vec::new();

    for (index, source) in sources.iter().enumerate() {
        let Ok(output) = derive_output_path(source, config.output_dir.as_deref()) else {
            continue;
        };
        let key = comparable(&output);

        if let Some(first) = claimed.get(&key) {
            conflicts.push((
                index,
                TransferError::Configuration(format!(
                    "output {} is already written by the task for {}",
                    output.display(),
                    first.display()
                )),
            ));
        } else if inputs.contains(&key) {
            conflicts.push((
                index,
                TransferError::Configuration(format!(
                    "output {} is the source of another task",
                    output.display()
                )),
            ));
        } else {
            claimed.insert(key, source);
        }
    }

    conflicts
}

/// Absolute form of `path` so `a/f.bin` and `./a/f.bin` compare equal.
fn comparable(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn log_failure(source: &Path, e: &TransferError) {
    error!(path = %source.display(), kind = %e.kind(), error = %e, "task failed");
}

async fn run_one(
    source: PathBuf,
    config: TaskConfig,
    remove_output: bool,
) -> Result<TaskReport, TransferError> {
    let mut task = Task::new(source.clone(), config).inspect_err(|e| log_failure(&source, e))?;

    // `Task::run` logs its own failures.
    let report = task.run().await?;
    if remove_output {
        cleanup(&task).await?;
    }
    Ok(report)
}

/// Removes a verified output, logging a failed removal as the task's failure.
async fn cleanup(task: &Task) -> Result<(), TransferError> {
    task.remove_output()
        .await
        .inspect_err(|e| log_failure(task.source(), e))
}
