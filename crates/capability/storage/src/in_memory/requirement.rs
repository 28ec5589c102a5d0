//! 需求内存存储实现

use crate::error::StorageError;
use crate::traits::RequirementStore;
use domain::{NewRequirement, Requirement, RequirementFilter, RequirementPage};
use std::sync::RwLock;

/// 需求内存存储
pub struct MemoryRequirementStore {
    items: RwLock<Vec<Requirement>>,
}

impl MemoryRequirementStore {
    /// 创建新的需求存储
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryRequirementStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 本地时间，`YYYY-MM-DD HH:MM:SS` 格式。
fn now_local() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 标题或内容包含关键词（大小写不敏感）；空关键词命中所有记录。
fn matches_keyword(item: &Requirement, keyword: &str) -> bool {
    if keyword.is_empty() {
        return true;
    }
    let keyword = keyword.to_lowercase();
    item.title.to_lowercase().contains(&keyword) || item.content.to_lowercase().contains(&keyword)
}

#[async_trait::async_trait]
impl RequirementStore for MemoryRequirementStore {
    async fn append_requirement(&self, req: NewRequirement) -> Result<(), StorageError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let now = now_local();
        let new_id = items.len() as i64 + 1;
        items.push(Requirement {
            id: new_id,
            title: req.title,
            content: req.content,
            willing_to_pay: req.willing_to_pay,
            contact: req.contact,
            notes: req.notes,
            created_at: now.clone(),
            updated_at: now,
        });
        Ok(())
    }

    async fn query_requirements(
        &self,
        page: i32,
        limit: i32,
        filter: RequirementFilter,
        keyword: &str,
    ) -> Result<RequirementPage, StorageError> {
        let items = self
            .items
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;

        let mut filtered: Vec<Requirement> = items
            .iter()
            .filter(|item| filter.matches(item.willing_to_pay) && matches_keyword(item, keyword))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.id.cmp(&a.id));

        let total = filtered.len() as i64;
        let offset = ((i64::from(page) - 1) * i64::from(limit)).max(0) as usize;
        let data = if offset >= filtered.len() {
            Vec::new()
        } else {
            let end = (offset + limit.max(0) as usize).min(filtered.len());
            filtered[offset..end].to_vec()
        };

        Ok(RequirementPage {
            data,
            total,
            page,
            limit,
        })
    }
}
