use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::types::{ChunkResult, ChunkSpec};
use crate::{READ_BUFFER_SIZE, TransferError};

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads single byte ranges of a source file.
///
/// Every call opens its own handle, so concurrent readers never share a
/// file offset.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
}

impl ChunkReader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Reads exactly `spec.len` bytes starting at `spec.start`.
    ///
    /// End of stream stops the read; a range that ends early is reported as
    /// [`TransferError::ShortRead`]. `cancel` is checked before opening and
    /// between reads.
    pub fn read_chunk(
        &self,
        spec: &ChunkSpec,
        cancel: &CancellationToken,
    ) -> Result<ChunkResult, TransferError> {
        let part = spec.part;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let mut file =
            File::open(&self.path).map_err(|source| TransferError::Read { part, source })?;
        file.seek(SeekFrom::Start(spec.start))
            .map_err(|source| TransferError::Seek {
                part,
                offset: spec.start,
                source,
            })?;

        let len = usize::try_from(spec.len).map_err(|_| {
            TransferError::Configuration(format!(
                "part {part} of {} bytes does not fit in memory",
                spec.len
            ))
        })?;
        let mut buf = vec![0u8; len];
        let mut filled = 0usize;

        while filled < len {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let end = (filled + READ_BUFFER_SIZE).min(len);
            match file.read(&mut buf[filled..end]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(TransferError::Read { part, source }),
            }
        }

        if filled < len {
            return Err(TransferError::ShortRead {
                part,
                expected: spec.len,
                actual: filled as u64,
            });
        }

        trace!(part, start = spec.start, len, "chunk read");
        Ok(ChunkResult { part, data: buf })
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Appends chunk payloads to an output file in strict part order.
pub struct ChunkWriter {
    path: PathBuf,
    file: File,
    next_part: u32,
    written: u64,
}

impl ChunkWriter {
    /// Creates (or truncates) the output file, creating parent directories.
    pub fn create(path: &Path) -> Result<Self, TransferError> {
        let write_err = |source| TransferError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(write_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_part: 0,
            written: 0,
        })
    }

    /// Appends the next part. Parts must arrive as 0, 1, 2, ...
    pub fn append(&mut self, chunk: &ChunkResult) -> Result<(), TransferError> {
        if chunk.part != self.next_part {
            return Err(TransferError::OutOfOrder {
                expected: self.next_part,
                actual: chunk.part,
            });
        }

        self.file
            .write_all(&chunk.data)
            .map_err(|source| TransferError::Write {
                path: self.path.clone(),
                source,
            })?;

        self.next_part += 1;
        self.written += chunk.data.len() as u64;
        Ok(())
    }

    /// Flushes the file to disk and returns the number of bytes written.
    pub fn finish(mut self) -> Result<u64, TransferError> {
        let write_err = |source| TransferError::Write {
            path: self.path.clone(),
            source,
        };
        self.file.flush().map_err(write_err)?;
        self.file.sync_all().map_err(write_err)?;
        Ok(self.written)
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Writes `chunks` to `path` in order on the blocking pool.
///
/// `chunks` must already be sorted by part index.
pub async fn write_chunks(path: &Path, chunks: Vec<ChunkResult>) -> Result<u64, TransferError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut writer = ChunkWriter::create(&path)?;
        for chunk in &chunks {
            writer.append(chunk)?;
        }
        let written = writer.finish()?;
        debug!(path = %path.display(), parts = chunks.len(), written, "output flushed");
        Ok(written)
    })
    .await
    .map_err(|e| TransferError::Join(e.to_string()))?
}
