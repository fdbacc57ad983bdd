//! Raw TCP data channel for whole files.
//!
//! One connection carries exactly one file's bytes. There is no framing, no
//! multiplexing and no acknowledgement: the client writes the file and shuts
//! down its write half, and the server persists everything it received up to
//! EOF at a fixed destination path.

pub mod client;
pub mod error;
pub mod server;

pub use client::RawFileClient;
pub use error::DataChannelError;
pub use server::RawFileServer;

use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Address the receiver listens on unless told otherwise.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5150";
