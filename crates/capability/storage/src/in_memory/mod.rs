//! 内存存储实现模块
//!
//! 单机部署与测试使用。
//!
//! 包含以下实现：
//! - TelemetryStore: MemoryTelemetryStore
//! - RequirementStore: MemoryRequirementStore

pub mod requirement;
pub mod telemetry;

pub use requirement::*;
pub use telemetry::*;
