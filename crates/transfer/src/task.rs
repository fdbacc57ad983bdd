//! One file's split, reassemble and verify job.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::TransferError;
use crate::chunked::write_chunks;
use crate::collector::collect_chunks;
use crate::integrity::{IntegritySignature, verify_files};
use crate::output::derive_output_path;
use crate::partition::partition;
use crate::types::{TaskConfig, TaskReport, TaskState};

/// A single file-transfer job.
///
/// Runs `Created -> SizeResolved -> Split -> Verified -> Completed`, or stops
/// in `Failed` on the first error. Nothing is retried.
#[derive(Debug)]
pub struct Task {
    source: PathBuf,
    output: PathBuf,
    size: Option<u64>,
    config: TaskConfig,
    state: TaskState,
    cancel: CancellationToken,
}

impl Task {
    /// Creates a task for `source`. The file itself is not touched yet.
    pub fn new(source: impl Into<PathBuf>, config: TaskConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let source = source.into();
        let output = derive_output_path(&source, config.output_dir.as_deref())?;
        Ok(Self {
            source,
            output,
            size: None,
            config,
            state: TaskState::Created,
            cancel: CancellationToken::new(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Size of the source, once resolved.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Stats the source and records its size.
    pub async fn resolve_size(&mut self) -> Result<u64, TransferError> {
        let stat_err = |source| TransferError::Stat {
            path: self.source.clone(),
            source,
        };
        let metadata = tokio::fs::metadata(&self.source).await.map_err(stat_err)?;
        if !metadata.is_file() {
            return Err(stat_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let size = metadata.len();
        self.size = Some(size);
        if self.state == TaskState::Created {
            self.advance(TaskState::SizeResolved)?;
        }
        Ok(size)
    }

    /// Runs the whole job, stopping at the first failure.
    ///
    /// A partially written output is left in place on failure; see
    /// [`remove_output`](Self::remove_output).
    pub async fn run(&mut self) -> Result<TaskReport, TransferError> {
        if !matches!(self.state, TaskState::Created | TaskState::SizeResolved) {
            return Err(TransferError::Configuration(format!(
                "task for {} already ran ({:?})",
                self.source.display(),
                self.state
            )));
        }

        let started = Instant::now();
        info!(path = %self.source.display(), output = %self.output.display(), "task started");

        match self.run_phases().await {
            Ok((size, parts, signature)) => {
                self.advance(TaskState::Completed)?;
                let elapsed = started.elapsed();
                info!(
                    path = %self.source.display(),
                    size,
                    parts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "transfer completed"
                );
                Ok(TaskReport {
                    source: self.source.clone(),
                    output: self.output.clone(),
                    size,
                    parts,
                    signature,
                    elapsed_ms: elapsed.as_millis(),
                })
            }
            Err(e) => {
                self.state = TaskState::Failed;
                error!(
                    path = %self.source.display(),
                    kind = %e.kind(),
                    error = %e,
                    "task failed"
                );
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<(u64, usize, IntegritySignature), TransferError> {
        let size = match self.size {
            Some(size) => size,
            None => self.resolve_size().await?,
        };
        info!(path = %self.source.display(), size, "file size resolved");

        let specs = partition(size, self.config.split_factor)?;
        debug!(
            path = %self.source.display(),
            parts = specs.len(),
            part_lens = ?specs.iter().map(|s| s.len).collect::<Vec<_>>(),
            "file partitioned"
        );

        let chunks = collect_chunks(&self.source, &specs, &self.cancel).await?;
        write_chunks(&self.output, chunks).await?;
        self.advance(TaskState::Split)?;

        let signature = self.verify().await?;
        self.advance(TaskState::Verified)?;

        Ok((size, specs.len(), signature))
    }

    async fn verify(&self) -> Result<IntegritySignature, TransferError> {
        let input = self.source.clone();
        let output = self.output.clone();
        let algorithm = self.config.digest;
        tokio::task::spawn_blocking(move || verify_files(&input, &output, algorithm))
            .await
            .map_err(|e| TransferError::Join(e.to_string()))?
    }

    fn advance(&mut self, next: TaskState) -> Result<(), TransferError> {
        if !self.state.can_advance_to(next) {
            return Err(TransferError::Configuration(format!(
                "illegal task transition {:?} -> {next:?}",
                self.state
            )));
        }
        debug!(path = %self.source.display(), from = ?self.state, to = ?next, "task state");
        self.state = next;
        Ok(())
    }

    /// Deletes the output file. Missing outputs are not an error.
    pub async fn remove_output(&self) -> Result<(), TransferError> {
        match tokio::fs::remove_file(&self.output).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TransferError::Write {
                path: self.output.clone(),
                source,
            }),
        }
    }
}
