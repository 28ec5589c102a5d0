//! TCP 服务器实现
//!
//! 接收连接，按连接切出完整 HTTP 请求并分发处理：
//! - 挂载工作池时，请求封装为任务投递执行，I/O 与业务解耦
//! - 未挂载时在连接任务内就地处理
//!
//! 同一连接上的响应按请求到达顺序写回：连接任务在写出上一个
//! 响应前不会分发下一个请求，流水线请求不会乱序。

use crate::connection::FrameBuffer;
use crate::error::ProtocolError;
use crate::http;
use async_trait::async_trait;
use dds_executor::{Task, WorkerPool};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 请求处理器：输入完整请求字节，返回完整响应字节。
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, raw: Vec<u8>) -> Vec<u8>;
}

/// HTTP 服务器。
pub struct HttpServer {
    listener: TcpListener,
    handler: Option<Arc<dyn RequestHandler>>,
    pool: Option<WorkerPool>,
    shutdown: watch::Sender<bool>,
    connections: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    next_conn_id: AtomicU64,
}

impl HttpServer {
    /// 绑定监听地址。
    pub async fn bind(host: &str, port: u16) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|err| ProtocolError::Bind(format!("{}:{}", host, port), err))?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            listener,
            handler: None,
            pool: None,
            shutdown,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// 实际监听地址（端口 0 时由内核分配）。
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn set_request_handler(&mut self, handler: Arc<dyn RequestHandler>) {
        self.handler = Some(handler);
    }

    pub fn set_worker_pool(&mut self, pool: WorkerPool) {
        self.pool = Some(pool);
    }

    /// 运行接入循环，直到 [`stop`](Self::stop) 被调用。
    pub async fn run(&self) {
        let Some(handler) = self.handler.clone() else {
            error!("request handler not set");
            return;
        };
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            return;
        }
        info!("server loop started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer, &handler),
                        Err(err) => error!(error = %err, "accept failed"),
                    }
                }
            }
        }
        info!("server loop exited");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, handler: &Arc<dyn RequestHandler>) {
        debug!(peer = %peer, "connection accepted");
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let handler = Arc::clone(handler);
        let pool = self.pool.clone();
        let connections = Arc::clone(&self.connections);
        let task = tokio::spawn(async move {
            serve_connection(stream, peer, handler, pool).await;
            if let Ok(mut map) = connections.lock() {
                map.remove(&conn_id);
            }
        });
        if let Ok(mut map) = self.connections.lock() {
            if !task.is_finished() {
                map.insert(conn_id, task);
            }
        }
    }

    /// 停止接入，等待在途任务执行完，然后清理存量连接。
    ///
    /// 重复调用是空操作。
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(pool) = &self.pool {
            pool.wait_idle().await;
        }
        let handles: Vec<_> = match self.connections.lock() {
            Ok(mut map) => map.drain().map(|(_, handle)| handle).collect(),
            Err(_) => Vec::new(),
        };
        for handle in &handles {
            handle.abort();
        }
        info!(connections = handles.len(), "server stopped");
    }
}

/// 单连接读写循环：读入字节，切出请求，分发并按序写回响应。
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    pool: Option<WorkerPool>,
) {
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; 4096];

    loop {
        while let Some(raw) = frames.extract_request() {
            let response = dispatch(&handler, pool.as_ref(), raw).await;
            if let Err(err) = stream.write_all(&response).await {
                warn!(peer = %peer, error = %err, "write failed");
                return;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) => {
                debug!(peer = %peer, "connection closed by peer");
                return;
            }
            Ok(n) => frames.extend(&chunk[..n]),
            Err(err) => {
                warn!(peer = %peer, error = %err, "read failed");
                return;
            }
        }
    }
}

async fn dispatch(
    handler: &Arc<dyn RequestHandler>,
    pool: Option<&WorkerPool>,
    raw: Vec<u8>,
) -> Vec<u8> {
    let Some(pool) = pool else {
        return handler.handle(raw).await;
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    let handler = Arc::clone(handler);
    let task: Task = Box::pin(async move {
        let response = handler.handle(raw).await;
        let _ = reply_tx.send(response);
    });
    pool.submit(task);
    match reply_rx.await {
        Ok(response) => response,
        // 工作池已停止，任务被丢弃
        Err(_) => http::build_response(500, "{\"code\":500,\"message\":\"Internal Server Error\"}"),
    }
}
