//! 遥测写入合批器
//!
//! 追加先进入内存缓冲：
//! - 缓冲达到 `batch_size` 时由追加方同步触发刷盘
//! - 后台任务按 `interval_ms` 周期刷盘
//! - 刷盘失败时整批重新排回缓冲头部，等待下次重试
//! - `shutdown` 停掉后台任务并做最后一次刷盘

use crate::error::StorageError;
use async_trait::async_trait;
use domain::DataPoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 批量写入目标。
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// 写入一批 `(device_id, point)`，返回写入条数。
    async fn write_batch(&self, entries: &[(String, DataPoint)]) -> Result<usize, StorageError>;
}

struct BatcherInner {
    writer: Arc<dyn BatchWriter>,
    batch_size: usize,
    buffer: Mutex<Vec<(String, DataPoint)>>,
    stopped: AtomicBool,
    stop: Notify,
    flush_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// 写入合批器。
#[derive(Clone)]
pub struct Batcher {
    inner: Arc<BatcherInner>,
}

impl Batcher {
    pub fn new(writer: Arc<dyn BatchWriter>, batch_size: usize) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                writer,
                batch_size: batch_size.max(1),
                buffer: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
                stop: Notify::new(),
                flush_task: std::sync::Mutex::new(None),
            }),
        }
    }

    /// 启动后台周期刷盘任务。
    pub fn spawn_interval_flush(&self, interval_ms: u64) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                    _ = inner.stop.notified() => break,
                }
                if inner.stopped.load(Ordering::Acquire) {
                    break;
                }
                let _ = flush_inner(&inner).await;
            }
        });
        if let Ok(mut slot) = self.inner.flush_task.lock() {
            *slot = Some(handle);
        }
    }

    /// 追加一条数据；缓冲满时由调用方同步触发刷盘。
    pub async fn push(&self, device_id: String, point: DataPoint) {
        let batch = {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push((device_id, point));
            if buffer.len() < self.inner.batch_size {
                return;
            }
            std::mem::take(&mut *buffer)
        };
        let _ = write_or_requeue(&self.inner, batch).await;
    }

    /// 立即刷盘缓冲中的所有数据。
    pub async fn flush(&self) -> Result<usize, StorageError> {
        flush_inner(&self.inner).await
    }

    /// 缓冲中指定设备的待写数据快照（读己之写）。
    pub async fn pending_for(&self, device_id: &str) -> Vec<DataPoint> {
        let buffer = self.inner.buffer.lock().await;
        buffer
            .iter()
            .filter(|(id, _)| id == device_id)
            .map(|(_, point)| point.clone())
            .collect()
    }

    /// 缓冲中的总条数。
    pub async fn pending_len(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    /// 停止后台任务并做最后一次刷盘。
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.stop.notify_waiters();
        let handle = match self.inner.flush_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let _ = flush_inner(&self.inner).await;
    }
}

async fn flush_inner(inner: &Arc<BatcherInner>) -> Result<usize, StorageError> {
    let batch = {
        let mut buffer = inner.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(0);
        }
        std::mem::take(&mut *buffer)
    };
    write_or_requeue(inner, batch).await
}

async fn write_or_requeue(
    inner: &Arc<BatcherInner>,
    batch: Vec<(String, DataPoint)>,
) -> Result<usize, StorageError> {
    match inner.writer.write_batch(&batch).await {
        Ok(written) => {
            debug!(written, "telemetry batch flushed");
            Ok(written)
        }
        Err(err) => {
            warn!(error = %err, size = batch.len(), "batch flush failed, requeueing");
            let mut buffer = inner.buffer.lock().await;
            let mut merged = batch;
            merged.append(&mut buffer);
            *buffer = merged;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct CountingWriter {
        batches: Mutex<Vec<usize>>,
    }

    #[derive(Default)]
    struct FailingWriter;

    #[async_trait]
    impl BatchWriter for CountingWriter {
        async fn write_batch(
            &self,
            entries: &[(String, DataPoint)],
        ) -> Result<usize, StorageError> {
            let mut batches = self.batches.lock().await;
            batches.push(entries.len());
            Ok(entries.len())
        }
    }

    #[async_trait]
    impl BatchWriter for FailingWriter {
        async fn write_batch(
            &self,
            _entries: &[(String, DataPoint)],
        ) -> Result<usize, StorageError> {
            Err(StorageError::new("forced failure"))
        }
    }

    fn sample_point(timestamp: i64) -> DataPoint {
        let mut metrics = BTreeMap::new();
        metrics.insert("cpu".to_string(), 0.5);
        DataPoint { timestamp, metrics }
    }

    #[tokio::test]
    async fn flushes_when_batch_size_reached() {
        let writer = Arc::new(CountingWriter::default());
        let batcher = Batcher::new(writer.clone(), 3);

        batcher.push("dev-1".to_string(), sample_point(1)).await;
        batcher.push("dev-1".to_string(), sample_point(2)).await;
        assert!(writer.batches.lock().await.is_empty());

        batcher.push("dev-1".to_string(), sample_point(3)).await;
        assert_eq!(writer.batches.lock().await.as_slice(), &[3]);
        assert_eq!(batcher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn interval_task_flushes_partial_batches() {
        let writer = Arc::new(CountingWriter::default());
        let batcher = Batcher::new(writer.clone(), 100);
        batcher.spawn_interval_flush(20);

        batcher.push("dev-1".to_string(), sample_point(1)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(writer.batches.lock().await.first().copied(), Some(1));
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn failed_flush_requeues_batch() {
        let batcher = Batcher::new(Arc::new(FailingWriter), 2);
        batcher.push("dev-1".to_string(), sample_point(1)).await;
        batcher.push("dev-2".to_string(), sample_point(2)).await;

        assert_eq!(batcher.pending_len().await, 2);
        assert_eq!(batcher.pending_for("dev-1").await.len(), 1);
    }

    #[tokio::test]
    async fn pending_for_filters_by_device() {
        let batcher = Batcher::new(Arc::new(CountingWriter::default()), 10);
        batcher.push("dev-1".to_string(), sample_point(1)).await;
        batcher.push("dev-2".to_string(), sample_point(2)).await;
        batcher.push("dev-1".to_string(), sample_point(3)).await;

        let pending = batcher.pending_for("dev-1").await;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].timestamp, 1);
        assert_eq!(pending[1].timestamp, 3);
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_buffer() {
        let writer = Arc::new(CountingWriter::default());
        let batcher = Batcher::new(writer.clone(), 100);
        batcher.spawn_interval_flush(10_000);

        batcher.push("dev-1".to_string(), sample_point(1)).await;
        batcher.push("dev-1".to_string(), sample_point(2)).await;
        batcher.shutdown().await;

        assert_eq!(writer.batches.lock().await.as_slice(), &[2]);
    }
}
