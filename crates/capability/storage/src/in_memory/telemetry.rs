//! 遥测内存存储实现

use crate::error::StorageError;
use crate::traits::TelemetryStore;
use domain::DataPoint;
use std::collections::HashMap;
use std::sync::RwLock;

/// 遥测内存存储
///
/// 设备号映射到按到达顺序追加的数据序列，读写锁保护。
pub struct MemoryTelemetryStore {
    series: RwLock<HashMap<String, Vec<DataPoint>>>,
}

impl MemoryTelemetryStore {
    /// 创建新的遥测存储
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    /// 当前累计的数据条数（用于测试）
    pub fn len(&self) -> usize {
        self.series
            .read()
            .map(|map| map.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn append(&self, device_id: &str, point: DataPoint) -> Result<(), StorageError> {
        let mut map = self
            .series
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.entry(device_id.to_string()).or_default().push(point);
        Ok(())
    }

    async fn query_latest(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let map = self
            .series
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(points) = map.get(device_id) else {
            return Ok(Vec::new());
        };
        let skip = points.len().saturating_sub(limit);
        Ok(points[skip..].to_vec())
    }

    async fn append_batch(
        &self,
        device_id: &str,
        points: Vec<DataPoint>,
    ) -> Result<(), StorageError> {
        let mut map = self
            .series
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.entry(device_id.to_string()).or_default().extend(points);
        Ok(())
    }
}
