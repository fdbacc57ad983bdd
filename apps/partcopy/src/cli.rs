//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use partcopy_transfer::DigestAlgorithm;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "partcopy", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/partcopy/partcopy.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split files into parallel chunks, reassemble and verify them.
    Split(SplitArgs),

    /// Send files to a receiver, one connection per file.
    Send {
        /// Receiver address.
        #[arg(long, default_value = partcopy_data_channel::DEFAULT_LISTEN_ADDR)]
        addr: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Receive files and store each one at a fixed destination.
    Receive {
        /// Address to listen on.
        #[arg(long, default_value = partcopy_data_channel::DEFAULT_LISTEN_ADDR)]
        listen: String,

        /// Path every received file is written to.
        #[arg(long)]
        dest: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
pub struct SplitArgs {
    /// Number of parts per file.
    #[arg(long, short = 'n')]
    pub split_factor: Option<u32>,

    /// Directory for reassembled files (default: next to each input).
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Digest used to verify the copy (sha256 or md5).
    #[arg(long)]
    pub digest: Option<DigestAlgorithm>,

    /// Maximum number of files processed at once.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Delete reassembled files after they verified.
    #[arg(long)]
    pub remove_outputs: bool,

    /// Print one JSON report per file on stdout.
    #[arg(long)]
    pub json: bool,

    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl SplitArgs {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(n) = self.split_factor {
            config.task.split_factor = n;
        }
        if let Some(dir) = &self.output_dir {
            config.task.output_dir = Some(dir.clone());
        }
        if let Some(digest) = self.digest {
            config.task.digest = digest;
        }
        if let Some(limit) = self.max_concurrent {
            config.max_concurrent_tasks = Some(limit);
        }
        if self.remove_outputs {
            config.remove_outputs = true;
        }
        config
    }
}
