//! 连接级请求切帧。
//!
//! 每条连接由一个任务独占持有套接字与 [`FrameBuffer`]，
//! 所有权即互斥，无需额外加锁。

use crate::http::find_subsequence;

const CONTENT_LENGTH: &[u8] = b"content-length:";

/// 连接读缓冲：累积字节流并按 HTTP 帧切出完整请求。
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加新收到的字节。
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// 尝试切出一个完整请求（头部 + 正文），并从缓冲中移除。
    ///
    /// 头部未收完或正文不足 `Content-Length` 字节时返回 `None`，
    /// 等待更多数据。同一缓冲中的流水线请求按到达顺序逐个切出。
    pub fn extract_request(&mut self) -> Option<Vec<u8>> {
        let header_end = find_subsequence(&self.buf, b"\r\n\r\n")?;
        let content_length = parse_content_length(&self.buf[..header_end]);
        let total = header_end + 4 + content_length;
        if self.buf.len() < total {
            return None;
        }
        let request = self.buf[..total].to_vec();
        self.buf.drain(..total);
        Some(request)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// 从头部区提取 `Content-Length`（大小写不敏感，冒号后允许空白）。
///
/// 缺失或非法时按 0 处理。
fn parse_content_length(header: &[u8]) -> usize {
    let lower: Vec<u8> = header.iter().map(u8::to_ascii_lowercase).collect();
    let Some(pos) = find_subsequence(&lower, CONTENT_LENGTH) else {
        return 0;
    };
    let mut idx = pos + CONTENT_LENGTH.len();
    while idx < header.len() && (header[idx] == b' ' || header[idx] == b'\t') {
        idx += 1;
    }
    let start = idx;
    while idx < header.len() && header[idx] != b'\r' && header[idx] != b'\n' {
        idx += 1;
    }
    std::str::from_utf8(&header[start..idx])
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0)
}
