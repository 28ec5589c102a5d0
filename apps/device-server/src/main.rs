//! 设备数据服务入口：装配配置、存储、工作池与 TCP 服务，
//! 并处理优雅退出。

mod handlers;
mod router;

use clap::Parser;
use dds_config::{Settings, StorageMode};
use dds_executor::WorkerPool;
use dds_protocol::HttpServer;
use dds_storage::{
    DbSettings, DeviceRegistry, MemoryRequirementStore, MemoryTelemetryStore, MySqlStore,
    PoolConfig, RegistryMode, RequirementStore, TelemetryStore,
};
use router::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 设备数据上报与查询服务
#[derive(Debug, Parser)]
#[command(name = "device-server", version)]
struct Cli {
    /// 配置文件路径
    #[arg(short = 'c', long = "config", default_value = "config.ini")]
    config: PathBuf,
}

struct Stores {
    telemetry: Arc<dyn TelemetryStore>,
    requirements: Arc<dyn RequirementStore>,
    registry: Arc<DeviceRegistry>,
    mysql: Option<Arc<MySqlStore>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    dds_telemetry::init_tracing(Some(Path::new("device_server.log")));
    info!("device data server starting");

    let (settings, loaded_from) = Settings::load(&cli.config);
    match &loaded_from {
        Some(path) => info!(path = %path.display(), "config loaded"),
        None => warn!(path = %cli.config.display(), "config file not found, using defaults"),
    }

    let stores = build_stores(&settings).await;

    let worker_count = effective_threads(settings.server.thread_pool_size);
    let pool = WorkerPool::start(worker_count);
    info!(workers = worker_count, "worker pool started");

    let router = Arc::new(Router::new(
        Arc::clone(&stores.telemetry),
        Arc::clone(&stores.requirements),
        Arc::clone(&stores.registry),
    ));
    let mut server = match HttpServer::bind("0.0.0.0", settings.server.port).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, port = settings.server.port, "failed to start server");
            return Err(err.into());
        }
    };
    server.set_request_handler(router);
    server.set_worker_pool(pool.clone());
    info!(port = settings.server.port, "server listening");

    let server = Arc::new(server);
    let run = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    wait_for_shutdown().await;
    info!("shutting down");

    server.stop().await;
    let _ = run.await;
    pool.stop().await;
    if let Some(store) = stores.mysql {
        store.shutdown().await;
    }

    info!("device data server stopped");
    Ok(())
}

/// 按配置选择存储后端；MySQL 初始化失败回退到内存模式。
async fn build_stores(settings: &Settings) -> Stores {
    match settings.storage.mode {
        StorageMode::Memory => memory_stores(),
        StorageMode::MySql | StorageMode::Hybrid => {
            let db = DbSettings {
                host: settings.mysql.host.clone(),
                port: settings.mysql.port,
                user: settings.mysql.user.clone(),
                password: settings.mysql.password.clone(),
                database: settings.mysql.database.clone(),
                connect_timeout_secs: settings.mysql.connect_timeout_secs,
            };
            let pool_config = PoolConfig {
                min_size: settings.mysql.pool_min,
                max_size: settings.mysql.pool_max,
                ..PoolConfig::default()
            };
            match MySqlStore::connect(
                db,
                pool_config,
                settings.storage.batch_size,
                settings.storage.batch_interval_ms,
            )
            .await
            {
                Ok(store) => {
                    let store = Arc::new(store);
                    let mode = match settings.storage.mode {
                        StorageMode::Hybrid => RegistryMode::Hybrid,
                        _ => RegistryMode::MySql,
                    };
                    info!(mode = ?settings.storage.mode, "using mysql storage");
                    Stores {
                        telemetry: Arc::clone(&store) as Arc<dyn TelemetryStore>,
                        requirements: Arc::clone(&store) as Arc<dyn RequirementStore>,
                        registry: Arc::new(DeviceRegistry::with_store(mode, Arc::clone(&store))),
                        mysql: Some(store),
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to initialize mysql store, falling back to memory mode");
                    memory_stores()
                }
            }
        }
    }
}

fn memory_stores() -> Stores {
    info!("using memory storage");
    Stores {
        telemetry: Arc::new(MemoryTelemetryStore::new()),
        requirements: Arc::new(MemoryRequirementStore::new()),
        registry: Arc::new(DeviceRegistry::memory()),
        mysql: None,
    }
}

/// 工作线程数：0 表示按 CPU 核数 ×2 推导，探测失败兜底为 4。
fn effective_threads(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

/// 等待 SIGINT / SIGTERM。
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
