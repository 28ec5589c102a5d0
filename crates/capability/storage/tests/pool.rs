//! 连接池计数不变量与等待语义（使用假后端，无需数据库）。

use async_trait::async_trait;
use dds_storage::{Backend, ConnectionPool, PoolConfig, StorageError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 假后端：连接是自增 id，探活与建连结果可控。
#[derive(Clone, Default)]
struct FakeBackend {
    created: Arc<AtomicUsize>,
    fail_connect: Arc<AtomicBool>,
    ping_ok: Arc<AtomicBool>,
}

impl FakeBackend {
    fn new() -> Self {
        let backend = Self::default();
        backend.ping_ok.store(true, Ordering::SeqCst);
        backend
    }
}

#[async_trait]
impl Backend for FakeBackend {
    type Conn = usize;

    async fn connect(&self) -> Result<usize, StorageError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(StorageError::new("connect refused"));
        }
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn ping(&self, _conn: &mut usize) -> bool {
        self.ping_ok.load(Ordering::SeqCst)
    }
}

fn config(min: usize, max: usize, timeout_ms: i64) -> PoolConfig {
    PoolConfig {
        min_size: min,
        max_size: max,
        acquire_timeout_ms: timeout_ms,
    }
}

#[tokio::test]
async fn init_creates_min_connections_eagerly() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend.clone(), config(2, 4, 100));
    pool.init().await.expect("init");

    let stats = pool.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.active, 0);
    assert_eq!(backend.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn init_fails_when_no_connection_can_be_made() {
    let backend = FakeBackend::new();
    backend.fail_connect.store(true, Ordering::SeqCst);
    let pool = ConnectionPool::new(backend, config(2, 4, 100));
    assert!(pool.init().await.is_err());
}

#[tokio::test]
async fn grows_lazily_up_to_max_and_times_out_when_saturated() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(1, 3, 50));
    pool.init().await.expect("init");

    let c1 = pool.acquire(50).await.expect("acquire 1");
    let c2 = pool.acquire(50).await.expect("acquire 2");
    let c3 = pool.acquire(50).await.expect("acquire 3");

    let stats = pool.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 3);
    assert_eq!(stats.idle, 0);

    // 池满：第 4 个在超时内拿不到
    assert!(pool.acquire(50).await.is_err());

    drop((c1, c2, c3));
    let stats = pool.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, 3);
}

#[tokio::test]
async fn counters_satisfy_invariants_during_churn() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(2, 4, 200));
    pool.init().await.expect("init");

    for _ in 0..5 {
        let a = pool.acquire(200).await.expect("a");
        let b = pool.acquire(200).await.expect("b");
        let stats = pool.stats();
        assert!(stats.total <= 4);
        assert!(stats.active <= stats.total);
        assert_eq!(stats.active + stats.idle, stats.total);
        drop((a, b));
    }
}

#[tokio::test]
async fn release_wakes_blocked_acquirer() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(1, 1, 1000));
    pool.init().await.expect("init");

    let held = pool.acquire(100).await.expect("hold");
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(1000).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    let conn = waiter.await.expect("join").expect("woken with connection");
    drop(conn);
}

#[tokio::test]
async fn failed_ping_replaces_connection() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend.clone(), config(1, 2, 100));
    pool.init().await.expect("init");

    backend.ping_ok.store(false, Ordering::SeqCst);
    let conn = pool.acquire(100).await.expect("replacement");
    // 初始连接 id 0 被淘汰，顶替的是新建的 id 1
    assert_eq!(*conn, 1);
    drop(conn);

    let stats = pool.stats();
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn zero_timeout_fails_fast_when_saturated() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(1, 1, 0));
    pool.init().await.expect("init");

    let held = pool.acquire(100).await.expect("hold");
    let started = std::time::Instant::now();
    assert!(pool.acquire(0).await.is_err());
    assert!(started.elapsed() < Duration::from_millis(500));
    drop(held);
}

#[tokio::test]
async fn acquire_after_shutdown_fails() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(1, 2, 100));
    pool.init().await.expect("init");

    pool.shutdown();
    assert!(pool.acquire(100).await.is_err());
    assert_eq!(pool.stats().total, 0);
}

#[tokio::test]
async fn connections_returned_after_shutdown_are_dropped() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend, config(1, 2, 100));
    pool.init().await.expect("init");

    let held = pool.acquire(100).await.expect("hold");
    pool.shutdown();
    drop(held);

    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.idle, 0);
}

#[tokio::test]
async fn reap_drops_dead_idle_connections() {
    let backend = FakeBackend::new();
    let pool = ConnectionPool::new(backend.clone(), config(2, 4, 100));
    pool.init().await.expect("init");

    backend.ping_ok.store(false, Ordering::SeqCst);
    pool.reap_invalid().await;

    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.idle, 0);
}
