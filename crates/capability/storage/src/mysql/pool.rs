//! 数据库连接池
//!
//! 有界并发的连接管理：
//! - 初始化时预建 `min_size` 条连接，按需增长到 `max_size`
//! - `acquire` 借出时 ping 探活，失效连接就地重建
//! - 池满时在 Notify 上等待，归还唤醒一个等待者
//! - 借出的连接由 [`PooledConn`] 守卫持有，任何退出路径都会归还
//!
//! 连接创建通过 [`Backend`] 接缝注入，便于在无数据库环境下
//! 验证池的计数不变量。

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// 连接后端：负责建连与探活。
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Conn: Send + 'static;

    async fn connect(&self) -> Result<Self::Conn, StorageError>;

    async fn ping(&self, conn: &mut Self::Conn) -> bool;
}

/// 连接池参数。
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    /// `acquire` 默认等待时长；负值表示无限等待。
    pub acquire_timeout_ms: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 20,
            acquire_timeout_ms: 5000,
        }
    }
}

/// 池计数快照（用于测试与观测）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
}

struct IdleConn<C> {
    conn: C,
    last_used: Instant,
}

struct PoolState<C> {
    idle: VecDeque<IdleConn<C>>,
    total: usize,
    active: usize,
    initialized: bool,
    shutdown: bool,
}

struct PoolInner<B: Backend> {
    backend: B,
    config: PoolConfig,
    state: Mutex<PoolState<B::Conn>>,
    available: Notify,
}

/// 有界数据库连接池。
pub struct ConnectionPool<B: Backend> {
    inner: Arc<PoolInner<B>>,
}

impl<B: Backend> Clone for ConnectionPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum Plan<C> {
    Reuse(C),
    Grow,
    Wait,
}

impl<B: Backend> ConnectionPool<B> {
    pub fn new(backend: B, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                backend,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                    active: 0,
                    initialized: false,
                    shutdown: false,
                }),
                available: Notify::new(),
            }),
        }
    }

    /// 初始化：预建 `min_size` 条连接；一条都建不起来则失败。
    ///
    /// 重复调用是空操作。
    pub async fn init(&self) -> Result<(), StorageError> {
        {
            let state = self.lock_state()?;
            if state.initialized {
                warn!("connection pool already initialized");
                return Ok(());
            }
        }

        let mut created = Vec::new();
        for _ in 0..self.inner.config.min_size {
            match self.inner.backend.connect().await {
                Ok(conn) => created.push(conn),
                Err(err) => warn!(error = %err, "failed to create initial connection"),
            }
        }
        if created.is_empty() && self.inner.config.min_size > 0 {
            return Err(StorageError::new("failed to create any database connection"));
        }

        let mut state = self.lock_state()?;
        state.total = created.len();
        state.active = 0;
        state.idle = created
            .into_iter()
            .map(|conn| IdleConn {
                conn,
                last_used: Instant::now(),
            })
            .collect();
        state.initialized = true;
        state.shutdown = false;
        info!(connections = state.total, "connection pool initialized");
        Ok(())
    }

    /// 借出一条连接。
    ///
    /// `timeout_ms` 为负表示无限等待；为 0 时立即超时返回。
    /// 空闲连接借出前 ping 探活，失效则重建一条顶替。
    pub async fn acquire(&self, timeout_ms: i64) -> Result<PooledConn<B>, StorageError> {
        let deadline = if timeout_ms >= 0 {
            Some(tokio::time::Instant::now() + Duration::from_millis(timeout_ms as u64))
        } else {
            None
        };

        loop {
            let plan = {
                let mut state = self.lock_state()?;
                if state.shutdown || !state.initialized {
                    return Err(StorageError::new("connection pool is not available"));
                }
                if let Some(idle) = state.idle.pop_front() {
                    state.active += 1;
                    Plan::Reuse(idle.conn)
                } else if state.total < self.inner.config.max_size {
                    // 预占名额，建连在锁外进行
                    state.total += 1;
                    state.active += 1;
                    Plan::Grow
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Reuse(mut conn) => {
                    if self.inner.backend.ping(&mut conn).await {
                        return Ok(PooledConn::new(conn, Arc::clone(&self.inner)));
                    }
                    warn!("pooled connection failed ping, replacing");
                    drop(conn);
                    match self.inner.backend.connect().await {
                        Ok(fresh) => return Ok(PooledConn::new(fresh, Arc::clone(&self.inner))),
                        Err(err) => {
                            self.rollback_slot();
                            return Err(err);
                        }
                    }
                }
                Plan::Grow => match self.inner.backend.connect().await {
                    Ok(conn) => return Ok(PooledConn::new(conn, Arc::clone(&self.inner))),
                    Err(err) => {
                        self.rollback_slot();
                        return Err(err);
                    }
                },
                Plan::Wait => {
                    let notified = self.inner.available.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    {
                        // 注册等待后复查，避免错过解锁与注册之间的归还
                        let state = self.lock_state()?;
                        if !state.idle.is_empty()
                            || state.total < self.inner.config.max_size
                            || state.shutdown
                        {
                            continue;
                        }
                    }
                    match deadline {
                        None => notified.await,
                        Some(deadline) => {
                            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                                warn!("timed out waiting for a database connection");
                                return Err(StorageError::new("acquire connection timed out"));
                            }
                        }
                    }
                }
            }
        }
    }

    /// 探活所有空闲连接，丢弃失效者（尽力而为）。
    pub async fn reap_invalid(&self) {
        let idle: Vec<IdleConn<B::Conn>> = match self.inner.state.lock() {
            Ok(mut state) => state.idle.drain(..).collect(),
            Err(_) => return,
        };
        let mut kept = Vec::new();
        let mut dropped = 0usize;
        for mut entry in idle {
            if self.inner.backend.ping(&mut entry.conn).await {
                kept.push(entry);
            } else {
                dropped += 1;
                debug!(
                    idle_for_ms = entry.last_used.elapsed().as_millis() as u64,
                    "dropping dead idle connection"
                );
            }
        }
        if let Ok(mut state) = self.inner.state.lock() {
            state.total = state.total.saturating_sub(dropped);
            state.idle.extend(kept);
        }
        if dropped > 0 {
            warn!(dropped, "removed invalid idle connections");
            self.inner.available.notify_waiters();
        }
    }

    /// 关闭连接池：丢弃空闲连接，在外连接归还时丢弃。
    ///
    /// 重复调用是空操作。
    pub fn shutdown(&self) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        if !state.initialized {
            return;
        }
        state.shutdown = true;
        state.initialized = false;
        let dropped = state.idle.len();
        state.idle.clear();
        state.total = state.total.saturating_sub(dropped);
        drop(state);
        self.inner.available.notify_waiters();
        info!("connection pool shut down");
    }

    /// 当前计数快照。
    pub fn stats(&self) -> PoolStats {
        self.inner
            .state
            .lock()
            .map(|state| PoolStats {
                total: state.total,
                active: state.active,
                idle: state.idle.len(),
            })
            .unwrap_or(PoolStats {
                total: 0,
                active: 0,
                idle: 0,
            })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PoolState<B::Conn>>, StorageError> {
        self.inner
            .state
            .lock()
            .map_err(|_| StorageError::new("lock failed"))
    }

    /// 建连失败时回滚预占的名额。
    fn rollback_slot(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.total = state.total.saturating_sub(1);
            state.active = state.active.saturating_sub(1);
        }
        self.inner.available.notify_one();
    }
}

/// 借出连接的作用域守卫，析构时归还连接池。
pub struct PooledConn<B: Backend> {
    conn: Option<B::Conn>,
    pool: Arc<PoolInner<B>>,
}

impl<B: Backend> PooledConn<B> {
    fn new(conn: B::Conn, pool: Arc<PoolInner<B>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }
}

impl<B: Backend> Deref for PooledConn<B> {
    type Target = B::Conn;

    fn deref(&self) -> &B::Conn {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<B: Backend> DerefMut for PooledConn<B> {
    fn deref_mut(&mut self) -> &mut B::Conn {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<B: Backend> Drop for PooledConn<B> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Ok(mut state) = self.pool.state.lock() else {
            return;
        };
        state.active = state.active.saturating_sub(1);
        if state.shutdown {
            state.total = state.total.saturating_sub(1);
            return;
        }
        state.idle.push_back(IdleConn {
            conn,
            last_used: Instant::now(),
        });
        drop(state);
        self.pool.available.notify_one();
    }
}
