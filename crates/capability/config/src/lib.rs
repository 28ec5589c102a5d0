//! 运行配置加载。
//!
//! 三层来源，后者覆盖前者：
//! 1. 内置默认值
//! 2. INI 配置文件（`[section] key=value`，`#`/`;` 注释，引号包裹的值去引号）
//! 3. 环境变量覆盖（`DEVICE_SERVER_*`）
//!
//! 对外只暴露只读的 [`Settings`] 快照。

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// 存储模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    MySql,
    Hybrid,
}

impl StorageMode {
    /// 解析模式字符串（大小写不敏感，兼容常见别名）。
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "mysql" | "db" | "database" => Self::MySql,
            "hybrid" | "mixed" | "both" => Self::Hybrid,
            _ => Self::Memory,
        }
    }
}

/// MySQL 连接与连接池配置。
#[derive(Debug, Clone)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_min: usize,
    pub pool_max: usize,
    pub connect_timeout_secs: u64,
}

/// HTTP 服务配置。
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    /// 显式配置为 0 时按 CPU 核数自动推导。
    pub thread_pool_size: usize,
}

/// 存储层配置。
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub mode: StorageMode,
    /// 0 表示关闭批量写入。
    pub batch_size: usize,
    pub batch_interval_ms: u64,
}

/// 运行配置快照。
#[derive(Debug, Clone)]
pub struct Settings {
    pub mysql: MySqlSettings,
    pub server: ServerSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mysql: MySqlSettings {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
                database: "device_data".to_string(),
                pool_min: 5,
                pool_max: 20,
                connect_timeout_secs: 5,
            },
            server: ServerSettings {
                port: 8080,
                thread_pool_size: 4,
            },
            storage: StorageSettings {
                mode: StorageMode::Memory,
                batch_size: 0,
                batch_interval_ms: 1000,
            },
        }
    }
}

impl Settings {
    /// 加载配置：依次尝试给定路径与常见相对路径，再叠加环境变量。
    ///
    /// 配置文件缺失不致命；返回实际命中的文件路径供调用方记录。
    pub fn load(primary: &Path) -> (Self, Option<PathBuf>) {
        let mut raw = RawConfig::new();
        let mut loaded_from = None;

        let fallbacks = [Path::new("../config.ini"), Path::new("../../config.ini")];
        for candidate in std::iter::once(primary).chain(fallbacks.iter().copied()) {
            if raw.merge_file(candidate).is_ok() {
                loaded_from = Some(candidate.to_path_buf());
                break;
            }
        }

        raw.merge_env();
        (Self::from_raw(&raw), loaded_from)
    }

    /// 从原始键值表构造快照（配置文件测试入口）。
    pub fn from_raw(raw: &RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            mysql: MySqlSettings {
                host: raw.get_string("mysql", "host", &defaults.mysql.host),
                port: raw.get_number("mysql", "port", defaults.mysql.port),
                user: raw.get_string("mysql", "user", &defaults.mysql.user),
                password: raw.get_string("mysql", "password", &defaults.mysql.password),
                database: raw.get_string("mysql", "database", &defaults.mysql.database),
                pool_min: raw.get_number("mysql", "pool_size_min", defaults.mysql.pool_min),
                pool_max: raw.get_number("mysql", "pool_size_max", defaults.mysql.pool_max),
                connect_timeout_secs: raw.get_number(
                    "mysql",
                    "connect_timeout",
                    defaults.mysql.connect_timeout_secs,
                ),
            },
            server: ServerSettings {
                port: raw.get_number("server", "port", defaults.server.port),
                thread_pool_size: raw.get_number(
                    "server",
                    "thread_pool_size",
                    defaults.server.thread_pool_size,
                ),
            },
            storage: StorageSettings {
                mode: raw
                    .get("storage", "mode")
                    .map(StorageMode::parse)
                    .unwrap_or(defaults.storage.mode),
                batch_size: raw.get_number("storage", "batch_size", defaults.storage.batch_size),
                batch_interval_ms: raw.get_number(
                    "storage",
                    "batch_interval_ms",
                    defaults.storage.batch_interval_ms,
                ),
            },
        }
    }
}

/// 分区的原始键值表。
#[derive(Debug, Default)]
pub struct RawConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl RawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取并合并一个 INI 文件。
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        self.merge_text(&text);
        Ok(())
    }

    /// 解析并合并 INI 文本。
    pub fn merge_text(&mut self, text: &str) {
        let mut section = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                if let Some(end) = rest.find(']') {
                    section = rest[..end].trim().to_string();
                }
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim());
            if !section.is_empty() && !key.is_empty() {
                self.sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.to_string(), value.to_string());
            }
        }
    }

    /// 叠加环境变量覆盖。
    pub fn merge_env(&mut self) {
        const MAPPINGS: &[(&str, &str, &str)] = &[
            ("mysql", "host", "DEVICE_SERVER_MYSQL_HOST"),
            ("mysql", "port", "DEVICE_SERVER_MYSQL_PORT"),
            ("mysql", "user", "DEVICE_SERVER_MYSQL_USER"),
            ("mysql", "password", "DEVICE_SERVER_MYSQL_PASSWORD"),
            ("mysql", "database", "DEVICE_SERVER_MYSQL_DATABASE"),
            ("mysql", "pool_size_min", "DEVICE_SERVER_MYSQL_POOL_MIN"),
            ("mysql", "pool_size_max", "DEVICE_SERVER_MYSQL_POOL_MAX"),
            ("mysql", "connect_timeout", "DEVICE_SERVER_MYSQL_TIMEOUT"),
            ("server", "port", "DEVICE_SERVER_PORT"),
            ("server", "thread_pool_size", "DEVICE_SERVER_THREADS"),
            ("storage", "mode", "DEVICE_SERVER_STORAGE_MODE"),
            ("storage", "batch_size", "DEVICE_SERVER_BATCH_SIZE"),
        ];
        for (section, key, env_name) in MAPPINGS {
            match env::var(env_name) {
                Ok(value) if !value.is_empty() => {
                    self.sections
                        .entry(section.to_string())
                        .or_default()
                        .insert(key.to_string(), value);
                }
                _ => {}
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.get(section, key)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    fn get_number<T: std::str::FromStr>(&self, section: &str, key: &str, default: T) -> T {
        self.get(section, key)
            .and_then(|value| value.parse::<T>().ok())
            .unwrap_or(default)
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        let quoted = (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'');
        if quoted {
            return &value[1..value.len() - 1];
        }
    }
    value
}
