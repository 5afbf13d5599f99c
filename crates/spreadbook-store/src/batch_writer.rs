//! Chunked concurrent batch writes.
//!
//! An operation list is split into chunks of at most the store's batch limit
//! and every chunk is issued as its own task on a [`JoinSet`]. A failing
//! chunk is logged and recorded in the [`WriteReport`]; its siblings still
//! run. Only the failed chunks are re-issued by [`BatchWriter::retry`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use spreadbook_types::constants::WRITE_RETRY_BACKOFF_MS;
use spreadbook_types::{Result, SpreadbookError};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::context::OpContext;
use crate::store::{KeyedStore, RecordKey, WriteOp};

/// A chunk that did not make it.
#[derive(Debug, Clone, Serialize)]
pub struct FailedChunk {
    #[serde(skip)]
    pub ops: Vec<WriteOp>,
    pub op_count: usize,
    pub error: String,
}

/// Outcome of a batch write.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReport {
    pub chunks: usize,
    pub total_ops: usize,
    pub failed: Vec<FailedChunk>,
}

impl WriteReport {
    #[must_use]
    pub fn failed_chunks(&self) -> usize {
        self.failed.len()
    }

    #[must_use]
    pub fn failed_ops(&self) -> usize {
        self.failed.iter().map(|c| c.op_count).sum()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Keys of every operation that was not written.
    #[must_use]
    pub fn failed_keys(&self) -> HashSet<RecordKey> {
        self.failed
            .iter()
            .flat_map(|c| c.ops.iter().map(|op| op.key().clone()))
            .collect()
    }

    /// Fold another report into this one.
    pub fn absorb(&mut self, other: WriteReport) {
        self.chunks += other.chunks;
        self.total_ops += other.total_ops;
        self.failed.extend(other.failed);
    }

    /// `Ok` when every chunk landed.
    ///
    /// # Errors
    /// [`SpreadbookError::PartialWrite`] with the failure counts.
    pub fn into_result(self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(SpreadbookError::PartialWrite {
                failed_ops: self.failed_ops(),
                total_ops: self.total_ops,
            })
        }
    }
}

#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn KeyedStore>,
    chunk_size: usize,
}

impl BatchWriter {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write `ops` in concurrent chunks.
    pub async fn write(&self, ctx: &OpContext, ops: Vec<WriteOp>) -> WriteReport {
        let total_ops = ops.len();
        let mut chunks: Vec<Vec<WriteOp>> = Vec::new();
        let mut ops = ops.into_iter().peekable();
        while ops.peek().is_some() {
            chunks.push(ops.by_ref().take(self.chunk_size).collect());
        }
        let report = self.write_chunks(ctx, chunks).await;
        WriteReport {
            total_ops,
            ..report
        }
    }

    async fn write_chunks(&self, ctx: &OpContext, chunks: Vec<Vec<WriteOp>>) -> WriteReport {
        let chunk_count = chunks.len();
        let total_ops = chunks.iter().map(Vec::len).sum();
        let mut tasks = JoinSet::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let ctx = ctx.clone();
            let chunk = chunk.clone();
            tasks.spawn(async move { (idx, ctx.run(store.batch_write(chunk)).await) });
        }

        let mut outcomes: Vec<Option<Result<()>>> = (0..chunk_count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, res)) => outcomes[idx] = Some(res),
                Err(e) => error!(error = %e, "batch chunk task aborted"),
            }
        }

        let mut failed = Vec::new();
        for (ops, outcome) in chunks.into_iter().zip(outcomes) {
            let error = match outcome {
                Some(Ok(())) => continue,
                Some(Err(e)) => e.to_string(),
                None => "chunk task did not complete".to_string(),
            };
            error!(ops = ops.len(), error = %error, "batch chunk failed");
            failed.push(FailedChunk {
                op_count: ops.len(),
                ops,
                error,
            });
        }
        WriteReport {
            chunks: chunk_count,
            total_ops,
            failed,
        }
    }

    /// Re-issue only the failed chunks of `report`, up to `attempts` rounds.
    pub async fn retry(&self, ctx: &OpContext, mut report: WriteReport, attempts: u32) -> WriteReport {
        for attempt in 1..=attempts {
            if report.is_complete() || ctx.check().is_err() {
                break;
            }
            if ctx
                .sleep(Duration::from_millis(WRITE_RETRY_BACKOFF_MS))
                .await
                .is_err()
            {
                break;
            }
            let pending: Vec<Vec<WriteOp>> = report.failed.drain(..).map(|c| c.ops).collect();
            warn!(attempt, chunks = pending.len(), "retrying failed batch chunks");
            report.failed = self.write_chunks(ctx, pending).await.failed;
        }
        if report.is_complete() {
            info!(chunks = report.chunks, ops = report.total_ops, "batch write complete");
        }
        report
    }

    /// [`BatchWriter::write`] followed by [`BatchWriter::retry`].
    pub async fn write_with_retry(
        &self,
        ctx: &OpContext,
        ops: Vec<WriteOp>,
        attempts: u32,
    ) -> WriteReport {
        let report = self.write(ctx, ops).await;
        self.retry(ctx, report, attempts).await
    }
}
