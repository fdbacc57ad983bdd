use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::integrity::{DigestAlgorithm, IntegritySignature};
use crate::{DEFAULT_SPLIT_FACTOR, TransferError};

/// A contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Dense, zero-based part index.
    pub part: u32,
    /// Byte offset of the first byte in the range.
    pub start: u64,
    /// Number of bytes in the range.
    pub len: u64,
}

impl ChunkSpec {
    /// Offset one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// The bytes read for one [`ChunkSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub part: u32,
    pub data: Vec<u8>,
}

/// Per-task tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Target number of parts per file.
    #[serde(default = "default_split_factor")]
    pub split_factor: u32,

    /// Directory receiving the reassembled file. `None` places it next to the source.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Digest used to compare input and output.
    #[serde(default)]
    pub digest: DigestAlgorithm,
}

fn default_split_factor() -> u32 {
    DEFAULT_SPLIT_FACTOR
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            split_factor: default_split_factor(),
            output_dir: None,
            digest: DigestAlgorithm::default(),
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.split_factor == 0 {
            return Err(TransferError::Configuration(
                "split factor must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a [`Task`](crate::Task).
///
/// States only move forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    SizeResolved,
    Split,
    Verified,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (Self::Created, Self::SizeResolved)
            | (Self::SizeResolved, Self::Split)
            | (Self::Split, Self::Verified)
            | (Self::Verified, Self::Completed) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Outcome of a successful task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub size: u64,
    pub parts: usize,
    pub signature: IntegritySignature,
    pub elapsed_ms: u128,
}
