//! 设备注册表
//!
//! 维护"见过的设备"集合，三种模式：
//! - Memory：仅内存集合
//! - MySql：委托 MySQL 存储
//! - Hybrid：内存缓存优先，未命中再查库并回填

use crate::mysql::MySqlStore;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::error;

/// 注册表工作模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    Memory,
    MySql,
    Hybrid,
}

/// 设备注册表。
pub struct DeviceRegistry {
    mode: RegistryMode,
    known: RwLock<HashSet<String>>,
    store: Option<Arc<MySqlStore>>,
}

impl DeviceRegistry {
    /// 纯内存注册表。
    pub fn memory() -> Self {
        Self {
            mode: RegistryMode::Memory,
            known: RwLock::new(HashSet::new()),
            store: None,
        }
    }

    /// 带 MySQL 委托的注册表。
    pub fn with_store(mode: RegistryMode, store: Arc<MySqlStore>) -> Self {
        Self {
            mode,
            known: RwLock::new(HashSet::new()),
            store: Some(store),
        }
    }

    /// 设备是否已注册。
    pub async fn exists(&self, device_id: &str) -> bool {
        match self.mode {
            RegistryMode::Memory => self.known_contains(device_id),
            RegistryMode::MySql => {
                let Some(store) = &self.store else {
                    error!("mysql store not set for device registry");
                    return false;
                };
                store.device_exists(device_id).await.unwrap_or_else(|err| {
                    error!(error = %err, "device lookup failed");
                    false
                })
            }
            RegistryMode::Hybrid => {
                if self.known_contains(device_id) {
                    return true;
                }
                let Some(store) = &self.store else {
                    return false;
                };
                match store.device_exists(device_id).await {
                    Ok(true) => {
                        self.remember(device_id);
                        true
                    }
                    Ok(false) => false,
                    Err(err) => {
                        error!(error = %err, "device lookup failed");
                        false
                    }
                }
            }
        }
    }

    /// 确保设备已注册；重复调用等价于一次。
    pub async fn ensure_registered(&self, device_id: &str) {
        match self.mode {
            RegistryMode::Memory => self.remember(device_id),
            RegistryMode::MySql => self.register_in_store(device_id).await,
            RegistryMode::Hybrid => {
                self.remember(device_id);
                self.register_in_store(device_id).await;
            }
        }
    }

    /// 内存集合中的设备数量（用于测试与观测）。
    pub fn device_count(&self) -> usize {
        self.known.read().map(|set| set.len()).unwrap_or(0)
    }

    fn known_contains(&self, device_id: &str) -> bool {
        self.known
            .read()
            .map(|set| set.contains(device_id))
            .unwrap_or(false)
    }

    fn remember(&self, device_id: &str) {
        if let Ok(mut set) = self.known.write() {
            set.insert(device_id.to_string());
        }
    }

    async fn register_in_store(&self, device_id: &str) {
        let Some(store) = &self.store else {
            error!("mysql store not set for device registry");
            return;
        };
        if let Err(err) = store.ensure_device_registered(device_id).await {
            error!(error = %err, device_id, "device registration failed");
        }
    }
}
