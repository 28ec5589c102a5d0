//! MySQL 存储实现
//!
//! 两套接口共用一个自管连接池：
//! - 遥测：`data_points` 表，metrics 列存放指标 JSON；
//!   配置了批量参数时写入先进合批器
//! - 需求：`requirements` 表，付费意愿三态映射为可空列
//! - 设备注册：`devices` 表，`INSERT IGNORE` 幂等注册

use crate::error::StorageError;
use crate::mysql::batcher::{BatchWriter, Batcher};
use crate::mysql::pool::{Backend, ConnectionPool, PoolConfig};
use crate::traits::{RequirementStore, TelemetryStore};
use async_trait::async_trait;
use domain::{DataPoint, NewRequirement, Requirement, RequirementFilter, RequirementPage, WillingToPay};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// MySQL 连接参数。
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout_secs: u64,
}

/// 基于 sqlx 的连接后端。
pub struct MySqlBackend {
    settings: DbSettings,
}

impl MySqlBackend {
    pub fn new(settings: DbSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    type Conn = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection, StorageError> {
        let options = MySqlConnectOptions::new()
            .host(&self.settings.host)
            .port(self.settings.port)
            .username(&self.settings.user)
            .password(&self.settings.password)
            .database(&self.settings.database);
        let timeout = Duration::from_secs(self.settings.connect_timeout_secs.max(1));
        match tokio::time::timeout(timeout, ConnectOptions::connect(&options)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::new("database connect timed out")),
        }
    }

    async fn ping(&self, conn: &mut MySqlConnection) -> bool {
        Connection::ping(conn).await.is_ok()
    }
}

pub type MySqlPool = ConnectionPool<MySqlBackend>;

/// MySQL 存储。
pub struct MySqlStore {
    pool: MySqlPool,
    acquire_timeout_ms: i64,
    batcher: Option<Batcher>,
}

impl MySqlStore {
    /// 建立连接池并按配置启用批量写入。
    pub async fn connect(
        db: DbSettings,
        pool_config: PoolConfig,
        batch_size: usize,
        batch_interval_ms: u64,
    ) -> Result<Self, StorageError> {
        let acquire_timeout_ms = pool_config.acquire_timeout_ms;
        let pool = ConnectionPool::new(MySqlBackend::new(db), pool_config);
        pool.init().await?;

        let batcher = if batch_size > 0 && batch_interval_ms > 0 {
            let writer = Arc::new(SqlPointWriter {
                pool: pool.clone(),
                acquire_timeout_ms,
            });
            let batcher = Batcher::new(writer, batch_size);
            batcher.spawn_interval_flush(batch_interval_ms);
            info!(batch_size, batch_interval_ms, "batched telemetry writes enabled");
            Some(batcher)
        } else {
            None
        };

        info!("mysql store initialized");
        Ok(Self {
            pool,
            acquire_timeout_ms,
            batcher,
        })
    }

    /// 关闭存储：停掉合批器（末次刷盘）再关连接池。
    pub async fn shutdown(&self) {
        if let Some(batcher) = &self.batcher {
            batcher.shutdown().await;
        }
        self.pool.shutdown();
        info!("mysql store shut down");
    }

    /// 检查设备是否已注册。
    pub async fn device_exists(&self, device_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;
        let row = sqlx::query("SELECT 1 FROM devices WHERE device_id = ? LIMIT 1")
            .bind(device_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// 确保设备已注册（不存在则插入，幂等）。
    pub async fn ensure_device_registered(&self, device_id: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;
        sqlx::query("INSERT IGNORE INTO devices (device_id) VALUES (?)")
            .bind(device_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// 按时间戳批量清理历史数据，返回删除条数。
    pub async fn delete_points_before(&self, timestamp: i64) -> Result<u64, StorageError> {
        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;
        let result = sqlx::query("DELETE FROM data_points WHERE timestamp < ?")
            .bind(timestamp)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// 合批器的 SQL 写入端：一条多 VALUES 的 INSERT 落一整批。
struct SqlPointWriter {
    pool: MySqlPool,
    acquire_timeout_ms: i64,
}

#[async_trait]
impl BatchWriter for SqlPointWriter {
    async fn write_batch(&self, entries: &[(String, DataPoint)]) -> Result<usize, StorageError> {
        insert_points(&self.pool, self.acquire_timeout_ms, entries).await
    }
}

async fn insert_points(
    pool: &MySqlPool,
    acquire_timeout_ms: i64,
    entries: &[(String, DataPoint)],
) -> Result<usize, StorageError> {
    if entries.is_empty() {
        return Ok(0);
    }
    let mut conn = pool.acquire(acquire_timeout_ms).await?;
    let mut builder = sqlx::QueryBuilder::<sqlx::MySql>::new(
        "INSERT INTO data_points (device_id, timestamp, metrics) ",
    );
    builder.push_values(entries, |mut row, (device_id, point)| {
        let metrics =
            serde_json::to_string(&point.metrics).unwrap_or_else(|_| "{}".to_string());
        row.push_bind(device_id)
            .push_bind(point.timestamp)
            .push_bind(metrics);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(entries.len())
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[async_trait]
impl TelemetryStore for MySqlStore {
    async fn append(&self, device_id: &str, point: DataPoint) -> Result<(), StorageError> {
        match &self.batcher {
            Some(batcher) => {
                batcher.push(device_id.to_string(), point).await;
                Ok(())
            }
            None => {
                insert_points(
                    &self.pool,
                    self.acquire_timeout_ms,
                    &[(device_id.to_string(), point)],
                )
                .await
                .map(|_| ())
            }
        }
    }

    async fn append_batch(
        &self,
        device_id: &str,
        points: Vec<DataPoint>,
    ) -> Result<(), StorageError> {
        match &self.batcher {
            Some(batcher) => {
                for point in points {
                    batcher.push(device_id.to_string(), point).await;
                }
                Ok(())
            }
            None => {
                let entries: Vec<(String, DataPoint)> = points
                    .into_iter()
                    .map(|point| (device_id.to_string(), point))
                    .collect();
                insert_points(&self.pool, self.acquire_timeout_ms, &entries)
                    .await
                    .map(|_| ())
            }
        }
    }

    /// 合批器里尚未落库的数据与查询结果合并返回，保证读己之写。
    async fn query_latest(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let mut merged = match &self.batcher {
            Some(batcher) => batcher.pending_for(device_id).await,
            None => Vec::new(),
        };

        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;
        let rows = sqlx::query(
            "SELECT timestamp, metrics FROM data_points \
             WHERE device_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(device_id)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;

        for row in rows {
            let timestamp: i64 = row.try_get("timestamp")?;
            let metrics: String = row.try_get("metrics")?;
            let metrics: BTreeMap<String, f64> =
                serde_json::from_str(&metrics).unwrap_or_default();
            merged.push(DataPoint { timestamp, metrics });
        }

        merged.sort_by_key(|point| point.timestamp);
        if merged.len() > limit {
            let excess = merged.len() - limit;
            merged.drain(..excess);
        }
        Ok(merged)
    }
}

#[async_trait]
impl RequirementStore for MySqlStore {
    async fn append_requirement(&self, req: NewRequirement) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;
        sqlx::query(
            "INSERT INTO requirements (title, content, willing_to_pay, contact, notes) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&req.title)
        .bind(&req.content)
        .bind(req.willing_to_pay.as_db())
        .bind(non_empty(&req.contact))
        .bind(non_empty(&req.notes))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn query_requirements(
        &self,
        page: i32,
        limit: i32,
        filter: RequirementFilter,
        keyword: &str,
    ) -> Result<RequirementPage, StorageError> {
        let mut clauses: Vec<&str> = Vec::new();
        let filter_value = match filter {
            RequirementFilter::No => {
                clauses.push("willing_to_pay = ?");
                Some(0i32)
            }
            RequirementFilter::Yes => {
                clauses.push("willing_to_pay = ?");
                Some(1i32)
            }
            RequirementFilter::Unset => {
                clauses.push("willing_to_pay IS NULL");
                None
            }
            RequirementFilter::Any => None,
        };
        if !keyword.is_empty() {
            clauses.push("(title LIKE ? OR content LIKE ?)");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let pattern = format!("%{}%", keyword);

        let mut conn = self.pool.acquire(self.acquire_timeout_ms).await?;

        let count_sql = format!("SELECT COUNT(*) FROM requirements{}", where_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(value) = filter_value {
            count_query = count_query.bind(value);
        }
        if !keyword.is_empty() {
            count_query = count_query.bind(&pattern).bind(&pattern);
        }
        let total = count_query.fetch_one(&mut *conn).await?;

        let offset = ((i64::from(page) - 1) * i64::from(limit)).max(0);
        let data_sql = format!(
            "SELECT id, title, content, willing_to_pay, contact, notes, \
             DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
             DATE_FORMAT(updated_at, '%Y-%m-%d %H:%i:%s') AS updated_at \
             FROM requirements{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut data_query = sqlx::query(&data_sql);
        if let Some(value) = filter_value {
            data_query = data_query.bind(value);
        }
        if !keyword.is_empty() {
            data_query = data_query.bind(&pattern).bind(&pattern);
        }
        let rows = data_query
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(Requirement {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                content: row.try_get("content")?,
                willing_to_pay: WillingToPay::from_db(row.try_get("willing_to_pay")?),
                contact: row
                    .try_get::<Option<String>, _>("contact")?
                    .unwrap_or_default(),
                notes: row
                    .try_get::<Option<String>, _>("notes")?
                    .unwrap_or_default(),
                created_at: row
                    .try_get::<Option<String>, _>("created_at")?
                    .unwrap_or_default(),
                updated_at: row
                    .try_get::<Option<String>, _>("updated_at")?
                    .unwrap_or_default(),
            });
        }

        Ok(RequirementPage {
            data,
            total,
            page,
            limit,
        })
    }
}
