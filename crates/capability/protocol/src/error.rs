//! 协议错误类型定义

/// 协议层错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 监听地址绑定失败
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
