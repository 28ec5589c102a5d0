//! # 存储模块
//!
//! 统一的数据存储抽象层，支持多种存储后端实现。
//!
//! ## 模块说明
//!
//! - [`traits`]：遥测与需求存储的异步接口定义
//! - [`error`]：统一的存储错误类型
//! - [`in_memory`]：内存实现（读写锁 + 容器，适合单机与测试）
//! - [`mysql`]：MySQL 实现（自管连接池 + 可选批量写入）
//! - [`registry`]：设备注册表（内存 / MySQL / 混合三种模式）
//!
//! ## 设计约束
//!
//! - Handler 层禁止直接写 SQL，统一通过本层接口
//! - 所有 SQL 使用参数绑定，防止注入
//! - 连接必须经由带作用域的守卫借出，任何退出路径都会归还

pub mod error;
pub mod in_memory;
pub mod mysql;
pub mod registry;
pub mod traits;

pub use error::StorageError;
pub use in_memory::{MemoryRequirementStore, MemoryTelemetryStore};
pub use mysql::{
    Backend, BatchWriter, Batcher, ConnectionPool, DbSettings, MySqlBackend, MySqlPool,
    MySqlStore, PoolConfig, PoolStats, PooledConn,
};
pub use registry::{DeviceRegistry, RegistryMode};
pub use traits::{RequirementStore, TelemetryStore};
