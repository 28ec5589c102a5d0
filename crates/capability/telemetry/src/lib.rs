//! 日志初始化。

use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化 tracing（默认 info，`RUST_LOG` 可覆盖）。
///
/// 指定日志文件时按行追加写入（无 ANSI 转义），否则输出到标准输出。
/// 重复调用安全，便于测试。
pub fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                eprintln!("failed to open log file {}: {}", path.display(), err);
                err
            })
            .ok()
    });

    match file {
        Some(file) => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
        }
    }
}
