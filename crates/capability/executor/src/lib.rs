//! 请求处理工作池。
//!
//! 固定数量的 worker 从 MPMC 任务队列取任务执行，将 I/O 就绪
//! 与业务处理解耦：
//! - `submit`：非阻塞入队，未运行时静默丢弃
//! - `wait_idle`：等待队列排空且无任务在执行
//! - `stop`：投递 worker 数量的哨兵（`None`）逐个唤醒退出，并等待全部 join

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// 工作池任务。
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Inner {
    tx: flume::Sender<Option<Task>>,
    rx: flume::Receiver<Option<Task>>,
    running: AtomicBool,
    /// 已提交但尚未执行完的任务数（提交时加一，任务结束减一）。
    pending: AtomicUsize,
    idle: Notify,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// 固定大小的工作池。
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// 启动 `worker_count` 个 worker。
    pub fn start(worker_count: usize) -> Self {
        let (tx, rx) = flume::unbounded();
        let inner = Arc::new(Inner {
            tx,
            rx,
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            worker_count,
            workers: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker = Arc::clone(&inner);
            handles.push(tokio::spawn(async move {
                worker_loop(worker, index).await;
            }));
        }
        if let Ok(mut workers) = inner.workers.lock() {
            *workers = handles;
        }

        Self { inner }
    }

    /// 提交一个任务；工作池未运行时静默丢弃。
    pub fn submit(&self, task: Task) {
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if self.inner.tx.send(Some(task)).is_err() {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// 等待所有已提交任务执行完毕。
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 停止工作池并等待所有 worker 退出；重复调用是空操作。
    ///
    /// 停止前已入队的任务仍会被执行完（哨兵排在它们之后）。
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for _ in 0..self.inner.worker_count {
            let _ = self.inner.tx.send(None);
        }
        let handles: Vec<_> = match self.inner.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(inner: Arc<Inner>, index: usize) {
    while let Ok(slot) = inner.rx.recv_async().await {
        // None 是关闭哨兵，恰好唤醒一个 worker
        let Some(task) = slot else { break };
        let _guard = PendingGuard { inner: &inner };
        debug!(worker = index, "executing task");
        task.await;
    }
}

/// 任务计数守卫：无论任务如何结束都递减并唤醒等待者。
struct PendingGuard<'a> {
    inner: &'a Inner,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        self.inner.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_task(counter: Arc<AtomicUsize>) -> Task {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let pool = WorkerPool::start(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            pool.submit(counting_task(Arc::clone(&counter)));
        }
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        pool.stop().await;
    }

    #[tokio::test]
    async fn wait_idle_waits_for_slow_tasks() {
        let pool = WorkerPool::start(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let slow = Arc::clone(&counter);
        pool.submit(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            slow.fetch_add(1, Ordering::SeqCst);
        }));
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_is_dropped() {
        let pool = WorkerPool::start(1);
        pool.stop().await;
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_task(Arc::clone(&counter)));
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_twice_is_noop() {
        let pool = WorkerPool::start(2);
        pool.stop().await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn queued_tasks_finish_before_stop_returns() {
        let pool = WorkerPool::start(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            pool.submit(counting_task(Arc::clone(&counter)));
        }
        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
