//! HTTP/1.1 请求解析与响应构造。
//!
//! 只覆盖本服务用到的子集：请求行 + 头部 + `Content-Length` 正文，
//! 不支持 chunked 编码与多行头部。

use std::collections::HashMap;

/// 解析后的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    /// 头部名称统一小写。
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// 解析一个完整的请求帧；请求行不完整时返回 `None`。
pub fn parse_request(raw: &[u8]) -> Option<HttpRequest> {
    let header_end = find_subsequence(raw, b"\r\n\r\n")?;
    let head = std::str::from_utf8(&raw[..header_end]).ok()?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next()?;
    let mut parts = request_line.splitn(3, ' ');
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    parts.next()?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.to_ascii_lowercase(), value.trim_start().to_string());
    }

    let body_len = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let body_start = header_end + 4;
    let body_end = (body_start + body_len).min(raw.len());
    let body = raw[body_start..body_end].to_vec();

    Some(HttpRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// 构造 JSON 响应。
pub fn build_response(status: u16, body: &str) -> Vec<u8> {
    build_response_with_type(status, body, "application/json")
}

/// 构造指定 Content-Type 的响应。
pub fn build_response_with_type(status: u16, body: &str, content_type: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n{}",
        status,
        status_text(status),
        content_type,
        body.len(),
        body
    )
    .into_bytes()
}

/// 状态码描述。
pub fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// 解析查询字符串（不做百分号解码，与取值方约定一致）。
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if !key.is_empty() {
            params.insert(key.to_string(), value.to_string());
        }
    }
    params
}

/// 在 `haystack` 中查找 `needle` 的起始位置。
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
