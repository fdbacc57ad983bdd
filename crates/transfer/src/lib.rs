//! Parallel file partitioning and ordered reassembly with integrity checks.
//!
//! A source file is divided into contiguous byte ranges, every range is read
//! concurrently, the payloads are reassembled in part order into an output
//! file, and the result is verified with a streaming content digest.

mod batch;
mod chunked;
mod collector;
mod integrity;
mod output;
mod partition;
mod task;
mod types;

use std::path::PathBuf;

use serde::Serialize;

pub use batch::{BatchOptions, BatchSummary, TaskOutcome, run_batch};
pub use chunked::{ChunkReader, ChunkWriter, write_chunks};
pub use collector::{ResultCollector, collect_chunks};
pub use integrity::{
    DigestAlgorithm, IntegritySignature, calculate_file_signature, checksum_bytes, verify_files,
};
pub use output::derive_output_path;
pub use partition::partition;
pub use task::Task;
pub use types::{ChunkResult, ChunkSpec, TaskConfig, TaskReport, TaskState};

/// Default number of parts a file is split into.
pub const DEFAULT_SPLIT_FACTOR: u32 = 5;

/// Largest single read issued by a [`ChunkReader`] between cancellation checks.
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Errors produced by the transfer pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seek to offset {offset} failed for part {part}: {source}")]
    Seek {
        part: u32,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed for part {part}: {source}")]
    Read {
        part: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("short read for part {part}: expected {expected} bytes, got {actual}")]
    ShortRead { part: u32, expected: u64, actual: u64 },

    #[error("cannot digest {}: {source}", path.display())]
    Digest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {} failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("part {expected} expected next, got part {actual}")]
    OutOfOrder { expected: u32, actual: u32 },

    #[error("integrity mismatch: input {expected}, output {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("part {0} delivered twice")]
    DuplicatePart(u32),

    #[error("part {part} outside of the {expected} expected parts")]
    UnexpectedPart { part: u32, expected: usize },

    #[error("part {0} never arrived")]
    MissingPart(u32),

    #[error("cancelled")]
    Cancelled,

    #[error("task join error: {0}")]
    Join(String),
}

/// Coarse failure category reported for a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StatFailure,
    SeekFailure,
    ReadFailure,
    WriteFailure,
    IntegrityMismatch,
    ConfigurationError,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatFailure => "stat_failure",
            Self::SeekFailure => "seek_failure",
            Self::ReadFailure => "read_failure",
            Self::WriteFailure => "write_failure",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::ConfigurationError => "configuration_error",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransferError {
    /// Maps the error onto its reported failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Stat { .. } => FailureKind::StatFailure,
            Self::Seek { .. } => FailureKind::SeekFailure,
            Self::Read { .. }
            | Self::ShortRead { .. }
            | Self::Digest { .. }
            | Self::DuplicatePart(_)
            | Self::UnexpectedPart { .. }
            | Self::MissingPart(_) => FailureKind::ReadFailure,
            Self::Write { .. } | Self::OutOfOrder { .. } => FailureKind::WriteFailure,
            Self::IntegrityMismatch { .. } => FailureKind::IntegrityMismatch,
            Self::Configuration(_) => FailureKind::ConfigurationError,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Join(_) => FailureKind::Internal,
        }
    }
}
