//! Bounded background writer for the history store.
//!
//! Callers enqueue records on a fixed-capacity channel; one writer task owns
//! the store handle and applies them in order. A full queue pushes back on
//! the caller instead of spawning unbounded work.

use std::sync::Arc;

use entityx_types::HistoryRecord;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::history::HistoryStore;

pub const DEFAULT_RECORDER_QUEUE_CAPACITY: usize = 256;

enum RecorderCommand {
    Append(HistoryRecord),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("history recorder is closed")]
    Closed,
    #[error("history recorder queue is full")]
    Full,
}

#[derive(Debug)]
pub struct HistoryRecorder {
    tx: mpsc::Sender<RecorderCommand>,
    writer: JoinHandle<()>,
    store: Arc<HistoryStore>,
}

impl HistoryRecorder {
    /// Start the writer task. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<HistoryStore>, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecorderCommand>(queue_capacity.max(1));
        let writer_store = Arc::clone(&store);
        let writer = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    RecorderCommand::Append(record) => writer_store.append(record),
                    RecorderCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!("history recorder drained");
        });

        Self { tx, writer, store }
    }

    /// Store the writer appends to.
    #[must_use]
    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Queue a record, waiting for capacity if the queue is full.
    pub async fn record(&self, record: HistoryRecord) -> Result<(), RecorderError> {
        self.tx
            .send(RecorderCommand::Append(record))
            .await
            .map_err(|_| RecorderError::Closed)
    }

    /// Queue a record without waiting.
    pub fn try_record(&self, record: HistoryRecord) -> Result<(), RecorderError> {
        self.tx
            .try_send(RecorderCommand::Append(record))
            .map_err(|e| match e {
                TrySendError::Full(_) => RecorderError::Full,
                TrySendError::Closed(_) => RecorderError::Closed,
            })
    }

    /// Wait until every record queued before this call has been appended.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Flush(ack_tx))
            .await
            .map_err(|_| RecorderError::Closed)?;
        ack_rx.await.map_err(|_| RecorderError::Closed)
    }

    /// Close the queue, let the writer drain it, and join the writer.
    pub async fn shutdown(self) {
        let Self { tx, writer, .. } = self;
        drop(tx);
        if let Err(e) = writer.await {
            tracing::warn!("history recorder task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use entityx_types::{EntityId, RecordType, RiskLevel};

    use super::*;
    use crate::history::HistoryQuery;

    fn record(n: i64) -> HistoryRecord {
        HistoryRecord {
            entity_id: EntityId::for_text("https://news.example.com/a", &n.to_string()),
            record_type: RecordType::Text,
            source_url: "https://news.example.com/a".to_string(),
            title: Some(format!("story {n}")),
            risk_level: RiskLevel::Medium,
            probability: 0.1,
            trust_score_after: 90.0,
            timestamp_ms: n,
        }
    }

    #[tokio::test]
    async fn flush_applies_queued_records() {
        let store = Arc::new(HistoryStore::default());
        let recorder = HistoryRecorder::spawn(Arc::clone(&store), 8);

        for n in 0..5 {
            recorder.record(record(n)).await.expect("record");
        }
        recorder.flush().await.expect("flush");

        assert_eq!(store.len(), 5);
        let page = store.query(&HistoryQuery::default());
        assert_eq!(page.records[0].timestamp_ms, 4);
    }

    #[tokio::test]
    async fn try_record_reports_full_queue() {
        // Current-thread runtime: the writer cannot run until we yield.
        let store = Arc::new(HistoryStore::default());
        let recorder = HistoryRecorder::spawn(Arc::clone(&store), 1);

        recorder.try_record(record(1)).expect("first fits");
        assert_eq!(recorder.try_record(record(2)), Err(RecorderError::Full));

        recorder.flush().await.expect("flush");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn record_applies_backpressure_then_succeeds() {
        let store = Arc::new(HistoryStore::default());
        let recorder = HistoryRecorder::spawn(Arc::clone(&store), 1);

        for n in 0..20 {
            recorder.record(record(n)).await.expect("record waits for capacity");
        }
        recorder.flush().await.expect("flush");
        assert_eq!(store.len(), 20);
    }

    #[tokio::test]
    async fn shutdown_drains_pending_records() {
        let store = Arc::new(HistoryStore::default());
        let recorder = HistoryRecorder::spawn(Arc::clone(&store), 16);

        for n in 0..10 {
            recorder.try_record(record(n)).expect("queued");
        }
        recorder.shutdown().await;

        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let store = Arc::new(HistoryStore::default());
        let recorder = HistoryRecorder::spawn(Arc::clone(&store), 0);
        recorder.record(record(0)).await.expect("record");
        recorder.flush().await.expect("flush");
        assert_eq!(recorder.store().len(), 1);
    }
}
