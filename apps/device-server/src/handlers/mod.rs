//! 请求处理器：把解析后的 HTTP 请求翻译为存储调用并组装响应。

pub mod device;
pub mod requirement;

use dds_protocol::http;

/// 统一成功应答。
pub(crate) fn ok_envelope() -> Vec<u8> {
    http::build_response(200, "{\"code\":0,\"message\":\"ok\"}")
}

/// 400 应答。
pub(crate) fn bad_request(message: &str) -> Vec<u8> {
    http::build_response(400, &format!("{{\"code\":400,\"message\":\"{}\"}}", message))
}
