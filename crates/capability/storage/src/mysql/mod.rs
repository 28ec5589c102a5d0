//! MySQL 存储实现模块
//!
//! - [`pool`]：有界连接池与作用域借出守卫
//! - [`batcher`]：遥测写入合批器
//! - [`store`]：遥测与需求两套接口的 SQL 实现

pub mod batcher;
pub mod pool;
pub mod store;

pub use batcher::{BatchWriter, Batcher};
pub use pool::{Backend, ConnectionPool, PoolConfig, PoolStats, PooledConn};
pub use store::{DbSettings, MySqlBackend, MySqlPool, MySqlStore};
