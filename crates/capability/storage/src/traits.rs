//! 存储接口 Trait 定义
//!
//! 两个能力接口按部署独立实例化：
//! - TelemetryStore：设备遥测数据的追加与查询
//! - RequirementStore：需求记录的追加与分页查询
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{DataPoint, NewRequirement, RequirementFilter, RequirementPage};

/// 遥测存储接口
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// 追加一条遥测数据
    async fn append(&self, device_id: &str, point: DataPoint) -> Result<(), StorageError>;

    /// 查询最近 `limit` 条数据，按时间戳升序返回
    async fn query_latest(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError>;

    /// 批量追加，默认退化为逐条追加
    async fn append_batch(
        &self,
        device_id: &str,
        points: Vec<DataPoint>,
    ) -> Result<(), StorageError> {
        for point in points {
            self.append(device_id, point).await?;
        }
        Ok(())
    }
}

/// 需求存储接口
#[async_trait]
pub trait RequirementStore: Send + Sync {
    /// 插入一条需求（id 与时间戳由存储层生成）
    async fn append_requirement(&self, req: NewRequirement) -> Result<(), StorageError>;

    /// 分页查询需求列表
    ///
    /// - `page`：页码（从 1 开始）
    /// - `limit`：每页条数
    /// - `filter`：付费意愿筛选
    /// - `keyword`：标题/内容模糊匹配，空串不过滤
    async fn query_requirements(
        &self,
        page: i32,
        limit: i32,
        filter: RequirementFilter,
        keyword: &str,
    ) -> Result<RequirementPage, StorageError>;
}
