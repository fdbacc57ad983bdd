//! TCP data client (sending side).
//!
//! Opens one connection per file and streams the file's raw bytes.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DataChannelError;
use crate::{TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// TCP data client for sending whole files.
pub struct RawFileClient;

impl RawFileClient {
    /// Sends one file over a fresh connection and returns the bytes sent.
    pub async fn send_file(
        addr: impl ToSocketAddrs,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, DataChannelError> {
        let file = tokio::fs::File::open(path).await?;
        let total_bytes = Self::send_reader(addr, file, cancel).await?;
        info!(path = %path.display(), total_bytes, "TCP data channel: file sent");
        Ok(total_bytes)
    }

    /// Sends several files, one connection each.
    ///
    /// Files that cannot be opened are logged and skipped; connection and
    /// write failures abort the remaining sends.
    pub async fn send_files(
        addr: impl ToSocketAddrs + Clone,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<(PathBuf, u64)>, DataChannelError> {
        let mut sent = Vec::with_capacity(files.len());

        for path in files {
            if cancel.is_cancelled() {
                return Err(DataChannelError::Cancelled);
            }

            let file = match tokio::fs::File::open(path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read file, skipping");
                    continue;
                }
            };

            let total_bytes = Self::send_reader(addr.clone(), file, cancel).await?;
            info!(path = %path.display(), total_bytes, "TCP data channel: file sent");
            sent.push((path.clone(), total_bytes));
        }

        Ok(sent)
    }

    /// Connects, streams `reader` to EOF and closes the write half.
    pub async fn send_reader<R: AsyncRead + Unpin>(
        addr: impl ToSocketAddrs,
        mut reader: R,
        cancel: &CancellationToken,
    ) -> Result<u64, DataChannelError> {
        // Connect with timeout + cancellation.
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)) => {
                match result {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };
        debug!(peer = ?stream.peer_addr().ok(), "TCP data channel connected");

        let mut writer = BufWriter::with_capacity(TCP_BUFFER_SIZE, stream);
        let mut buf = vec![0u8; TCP_BUFFER_SIZE];
        let mut total_bytes = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(DataChannelError::Cancelled);
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            total_bytes += n as u64;
        }

        writer.flush().await?;
        writer.shutdown().await?;
        Ok(total_bytes)
    }
}
