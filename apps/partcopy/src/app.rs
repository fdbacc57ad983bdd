//! Command execution.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use partcopy_data_channel::{RawFileClient, RawFileServer};
use partcopy_transfer::{BatchSummary, TaskOutcome, run_batch};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command, SplitArgs};
use crate::config::Config;

/// Runs the parsed command. Returns `false` when any file failed.
pub async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Split(args) => split(args, config).await,
        Command::Send { addr, files } => send(&addr, &files).await,
        Command::Receive { listen, dest } => receive(&listen, dest).await,
    }
}

async fn split(args: SplitArgs, config: Config) -> anyhow::Result<bool> {
    let config = args.apply(config);
    config.task.validate()?;
    tracing::info!(
        files = args.files.len(),
        split_factor = config.task.split_factor,
        digest = %config.task.digest,
        "starting batch"
    );

    let started = Instant::now();
    let outcomes = run_batch(args.files.clone(), config.task.clone(), config.batch_options()).await;
    let summary = BatchSummary::from_outcomes(&outcomes, started.elapsed().as_millis());

    if args.json {
        for outcome in &outcomes {
            println!("{}", serde_json::to_string(&JsonOutcome::from(outcome))?);
        }
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => println!(
                    "ok    {} -> {} ({} bytes, {} parts, {})",
                    report.source.display(),
                    report.output.display(),
                    report.size,
                    report.parts,
                    report.signature
                ),
                Err(e) => println!("FAIL  {} [{}] {e}", outcome.source.display(), e.kind()),
            }
        }
        println!(
            "{} succeeded, {} failed in {} ms",
            summary.succeeded, summary.failed, summary.elapsed_ms
        );
    }

    Ok(summary.failed == 0)
}

async fn send(addr: &str, files: &[PathBuf]) -> anyhow::Result<bool> {
    let cancel = CancellationToken::new();
    let sent = RawFileClient::send_files(addr.to_string(), files, &cancel)
        .await
        .with_context(|| format!("sending to {addr}"))?;
    for (path, bytes) in &sent {
        println!("sent  {} ({bytes} bytes)", path.display());
    }
    Ok(sent.len() == files.len())
}

async fn receive(listen: &str, dest: PathBuf) -> anyhow::Result<bool> {
    let cancel = CancellationToken::new();
    let server = RawFileServer::new(dest, cancel.clone());
    let listener = server
        .bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
        }
        cancel.cancel();
    });

    let received = server.serve(listener).await?;
    tracing::info!(received, "receiver stopped");
    Ok(true)
}

/// Machine-readable line for one file.
#[derive(Serialize)]
struct JsonOutcome<'a> {
    source: &'a std::path::Path,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a partcopy_transfer::TaskReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<partcopy_transfer::FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a TaskOutcome> for JsonOutcome<'a> {
    fn from(outcome: &'a TaskOutcome) -> Self {
        match &outcome.result {
            Ok(report) => Self {
                source: &outcome.source,
                ok: true,
                report: Some(report),
                kind: None,
                error: None,
            },
            Err(e) => Self {
                source: &outcome.source,
                ok: false,
                report: None,
                kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }
}
