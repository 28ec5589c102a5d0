//! TCP 接入与 HTTP 编解码。
//!
//! 监听 TCP 端口，按连接维护字节缓冲，从字节流中切出完整的
//! HTTP/1.1 请求交给请求处理器；可选地把处理过程投递到工作池，
//! 使 I/O 与业务处理解耦。

pub mod connection;
pub mod error;
pub mod http;
pub mod server;

pub use connection::FrameBuffer;
pub use error::ProtocolError;
pub use http::HttpRequest;
pub use server::{HttpServer, RequestHandler};
