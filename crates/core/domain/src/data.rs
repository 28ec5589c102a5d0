use std::collections::BTreeMap;

/// 设备上报的单条遥测数据。
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp: i64,
    pub metrics: BTreeMap<String, f64>,
}

/// 付费意愿三态：空/不愿意/愿意。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WillingToPay {
    Unset,
    No,
    Yes,
}

impl WillingToPay {
    /// 从请求体取值构造（缺失、null 和其他数值都归为空）。
    pub fn from_wire(value: Option<i64>) -> Self {
        match value {
            Some(0) => Self::No,
            Some(1) => Self::Yes,
            _ => Self::Unset,
        }
    }

    /// 转换为响应体取值（空 ⇒ null）。
    pub fn as_wire(&self) -> Option<i64> {
        match self {
            Self::Unset => None,
            Self::No => Some(0),
            Self::Yes => Some(1),
        }
    }

    /// 从数据库列值构造（NULL ⇒ 空）。
    pub fn from_db(value: Option<i32>) -> Self {
        match value {
            Some(0) => Self::No,
            Some(1) => Self::Yes,
            _ => Self::Unset,
        }
    }

    /// 转换为数据库列值（空 ⇒ NULL）。
    pub fn as_db(&self) -> Option<i32> {
        match self {
            Self::Unset => None,
            Self::No => Some(0),
            Self::Yes => Some(1),
        }
    }
}

/// 需求记录（id 与时间戳由存储层生成）。
#[derive(Debug, Clone)]
pub struct Requirement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub willing_to_pay: WillingToPay,
    pub contact: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

/// 待写入的需求（上报请求的领域形态）。
#[derive(Debug, Clone)]
pub struct NewRequirement {
    pub title: String,
    pub content: String,
    pub willing_to_pay: WillingToPay,
    pub contact: String,
    pub notes: String,
}

/// 需求查询的付费意愿筛选条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementFilter {
    Any,
    No,
    Yes,
    Unset,
}

impl RequirementFilter {
    /// 从查询参数取值构造：0/1 精确匹配，2 仅匹配空，其余不过滤。
    pub fn from_query(value: Option<i64>) -> Self {
        match value {
            Some(0) => Self::No,
            Some(1) => Self::Yes,
            Some(2) => Self::Unset,
            _ => Self::Any,
        }
    }

    /// 判断一条需求是否命中该筛选条件。
    pub fn matches(&self, willing_to_pay: WillingToPay) -> bool {
        match self {
            Self::Any => true,
            Self::No => willing_to_pay == WillingToPay::No,
            Self::Yes => willing_to_pay == WillingToPay::Yes,
            Self::Unset => willing_to_pay == WillingToPay::Unset,
        }
    }
}

/// 需求分页查询结果。
#[derive(Debug, Clone)]
pub struct RequirementPage {
    pub data: Vec<Requirement>,
    pub total: i64,
    pub page: i32,
    pub limit: i32,
}

impl Default for RequirementPage {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            page: 1,
            limit: 100,
        }
    }
}
