//! TCP data server (receiving side).
//!
//! Accepts connections until cancelled and persists the bytes of each
//! connection at a fixed destination path.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::DataChannelError;

/// TCP data server for receiving whole files.
#[derive(Debug)]
pub struct RawFileServer {
    destination: PathBuf,
    cancel: CancellationToken,
    next_connection: AtomicU64,
}

impl RawFileServer {
    pub fn new(destination: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            destination,
            cancel,
            next_connection: AtomicU64::new(0),
        }
    }

    /// Binds the listening socket.
    pub async fn bind(&self, addr: impl ToSocketAddrs) -> Result<TcpListener, DataChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "TCP data channel listener bound");
        Ok(listener)
    }

    /// Accepts connections until the cancellation token fires.
    ///
    /// Every connection is received on its own task. A failed connection is
    /// logged and does not stop the listener. Returns the number of files
    /// persisted.
    pub async fn serve(&self, listener: TcpListener) -> Result<u64, DataChannelError> {
        let mut connections = JoinSet::new();
        let mut received = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("TCP data channel: shutting down listener");
                    break;
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if record_connection(joined) {
                        received += 1;
                    }
                }
                result = listener.accept() => {
                    let Some(stream) = accepted(result) else {
                        continue;
                    };
                    let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
                    let destination = self.destination.clone();
                    let cancel = self.cancel.clone();
                    connections.spawn(async move {
                        receive_to(stream, &destination, id, &cancel).await
                    });
                }
            }
        }

        drop(listener);
        while let Some(joined) = connections.join_next().await {
            if record_connection(joined) {
                received += 1;
            }
        }
        Ok(received)
    }

    /// Accepts a single connection and persists its bytes.
    pub async fn accept_one(&self, listener: TcpListener) -> Result<u64, DataChannelError> {
        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = listener.accept() => {
                let (stream, addr) = result?;
                info!(%addr, "TCP data channel connection accepted");
                stream
            }
        };
        drop(listener);
        self.receive(stream).await
    }

    /// Persists everything `stream` delivers until EOF.
    pub async fn receive(&self, stream: TcpStream) -> Result<u64, DataChannelError> {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        receive_to(stream, &self.destination, id, &self.cancel).await
    }
}

/// Unwraps an accepted connection. A failed accept is logged and skipped so
/// the listener keeps running.
fn accepted(result: std::io::Result<(TcpStream, SocketAddr)>) -> Option<TcpStream> {
    match result {
        Ok((stream, addr)) => {
            info!(%addr, "TCP data channel connection accepted");
            Some(stream)
        }
        Err(e) => {
            warn!(error = %e, "TCP data channel: accept failed");
            None
        }
    }
}

fn record_connection(joined: Result<Result<u64, DataChannelError>, tokio::task::JoinError>) -> bool {
    match joined {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "TCP data channel: connection failed");
            false
        }
        Err(e) => {
            warn!(error = %e, "TCP data channel: connection task failed");
            false
        }
    }
}

/// Streams one connection into a scratch file, then moves it over
/// `destination` so concurrent connections never interleave bytes.
async fn receive_to(
    stream: TcpStream,
    destination: &Path,
    id: u64,
    cancel: &CancellationToken,
) -> Result<u64, DataChannelError> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let scratch = scratch_path(destination, id);
    let result = copy_until_eof(stream, &scratch, cancel).await;
    let total_bytes = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&scratch).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&scratch, destination).await?;
    info!(
        total_bytes,
        destination = %destination.display(),
        "TCP data channel: file received"
    );
    Ok(total_bytes)
}

async fn copy_until_eof(
    stream: TcpStream,
    scratch: &Path,
    cancel: &CancellationToken,
) -> Result<u64, DataChannelError> {
    let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, stream);
    let mut file = tokio::fs::File::create(scratch).await?;
    let mut buf = vec![0u8; TCP_BUFFER_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DataChannelError::Cancelled),
            n = reader.read(&mut buf) => n?,
        };
        if n == 0 {
            debug!(total_bytes, "TCP data channel: peer closed connection");
            break;
        }
        file.write_all(&buf[..n]).await?;
        total_bytes += n as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(total_bytes)
}

fn scratch_path(destination: &Path, id: u64) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "received".into());
    name.push(format!(".{id}.part"));
    destination.with_file_name(name)
}
