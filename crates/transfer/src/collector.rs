use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;
use crate::chunked::ChunkReader;
use crate::types::{ChunkResult, ChunkSpec};

/// Gathers chunk payloads into fixed, part-indexed slots.
///
/// Every slot is written at most once, so no locking is needed between
/// parts.
#[derive(Debug)]
pub struct ResultCollector {
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl ResultCollector {
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            received: 0,
        }
    }

    /// Stores `result` in its slot.
    pub fn insert(&mut self, result: ChunkResult) -> Result<(), TransferError> {
        let expected = self.slots.len();
        let slot = self
            .slots
            .get_mut(result.part as usize)
            .ok_or(TransferError::UnexpectedPart {
                part: result.part,
                expected,
            })?;
        if slot.is_some() {
            return Err(TransferError::DuplicatePart(result.part));
        }
        *slot = Some(result.data);
        self.received += 1;
        Ok(())
    }

    /// Returns `true` once every expected part has arrived.
    pub fn is_complete(&self) -> bool {
        self.received == self.slots.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Consumes the collector, yielding results in ascending part order.
    pub fn into_ordered(self) -> Result<Vec<ChunkResult>, TransferError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(part, slot)| {
                let part = part as u32;
                slot.map(|data| ChunkResult { part, data })
                    .ok_or(TransferError::MissingPart(part))
            })
            .collect()
    }
}

/// Reads every chunk range concurrently and waits until all parts have arrived.
///
/// Each range runs on its own blocking task. Results flow back over a channel
/// sized to the range count. The first failure cancels `cancel`, aborts the
/// readers that have not started yet, and is returned.
pub async fn collect_chunks(
    source: &Path,
    specs: &[ChunkSpec],
    cancel: &CancellationToken,
) -> Result<Vec<ChunkResult>, TransferError> {
    let (tx, mut rx) = mpsc::channel(specs.len().max(1));
    let reader = ChunkReader::new(source);
    let mut readers = JoinSet::new();

    for spec in specs.iter().copied() {
        let tx = tx.clone();
        let reader = reader.clone();
        let cancel = cancel.clone();
        readers.spawn_blocking(move || {
            let result = reader.read_chunk(&spec, &cancel);
            // The receiver is gone once the collector bailed out.
            let _ = tx.blocking_send(result);
        });
    }
    drop(tx);

    let mut collector = ResultCollector::new(specs.len());
    while let Some(result) = rx.recv().await {
        if let Err(e) = result.and_then(|chunk| collector.insert(chunk)) {
            warn!(path = %source.display(), error = %e, "chunk failed, cancelling siblings");
            cancel.cancel();
            readers.abort_all();
            return Err(e);
        }
    }

    // Every sender is dropped: all readers have finished.
    while let Some(joined) = readers.join_next().await {
        joined.map_err(|e| TransferError::Join(e.to_string()))?;
    }

    debug!(
        path = %source.display(),
        parts = collector.received(),
        "all chunks collected"
    );
    collector.into_ordered()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(part: u32, data: &[u8]) -> ChunkResult {
        ChunkResult {
            part,
            data: data.to_vec(),
        }
    }

    #[test]
    fn orders_results_regardless_of_arrival() {
        let mut collector = ResultCollector::new(3);
        collector.insert(result(2, b"c")).unwrap();
        collector.insert(result(0, b"a")).unwrap();
        assert!(!collector.is_complete());
        collector.insert(result(1, b"b")).unwrap();
        assert!(collector.is_complete());

        let ordered = collector.into_ordered().unwrap();
        let parts: Vec<u32> = ordered.iter().map(|r| r.part).collect();
        assert_eq!(parts, vec![0, 1, 2]);
        let joined: Vec<u8> = ordered.into_iter().flat_map(|r| r.data).collect();
        assert_eq!(joined, b"abc");
    }

    #[test]
    fn slots_are_write_once() {
        let mut collector = ResultCollector::new(2);
        collector.insert(result(0, b"a")).unwrap();
        assert!(matches!(
            collector.insert(result(0, b"again")),
            Err(TransferError::DuplicatePart(0))
        ));
        assert_eq!(collector.received(), 1);
    }

    #[test]
    fn rejects_unknown_part() {
        let mut collector = ResultCollector::new(2);
        assert!(matches!(
            collector.insert(result(5, b"x")),
            Err(TransferError::UnexpectedPart {
                part: 5,
                expected: 2
            })
        ));
    }

    #[test]
    fn missing_part_detected() {
        let mut collector = ResultCollector::new(3);
        collector.insert(result(0, b"a")).unwrap();
        collector.insert(result(2, b"c")).unwrap();
        assert!(matches!(
            collector.into_ordered(),
            Err(TransferError::MissingPart(1))
        ));
    }

    #[test]
    fn empty_collector_is_complete() {
        let collector = ResultCollector::new(0);
        assert!(collector.is_complete());
        assert!(collector.into_ordered().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collects_all_parts_concurrently() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let path = dir.path().join("src.bin");
        std::fs::write(&path, &data).unwrap();

        let specs = crate::partition(data.len() as u64, 7).unwrap();
        let cancel = CancellationToken::new();
        let chunks = collect_chunks(&path, &specs, &cancel).await.unwrap();

        assert_eq!(chunks.len(), specs.len());
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        assert_eq!(joined, data);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn no_specs_yields_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let chunks = collect_chunks(&path, &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn first_failure_cancels_task() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("src.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        // The last range runs past the end of the file.
        let specs = vec![
            ChunkSpec {
                part: 0,
                start: 0,
                len: 5,
            },
            ChunkSpec {
                part: 1,
                start: 5,
                len: 10,
            },
        ];
        let cancel = CancellationToken::new();
        let result = collect_chunks(&path, &specs, &cancel).await;

        assert!(matches!(
            result,
            Err(TransferError::ShortRead { part: 1, .. })
        ));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let specs = crate::partition(10, 2).unwrap();
        let result = collect_chunks(
            &dir.path().join("gone.bin"),
            &specs,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(TransferError::Read { .. })));
    }
}
