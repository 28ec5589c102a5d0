//! 需求上报与分页查询。

use dds_protocol::http::{self, HttpRequest};
use dds_storage::RequirementStore;
use domain::{NewRequirement, RequirementFilter, RequirementPage, WillingToPay};
use serde::Deserialize;
use tracing::error;

/// 上报请求体；`willing_to_pay` 缺失与 null 等价。
#[derive(Debug, Deserialize)]
struct ReportBody {
    title: String,
    content: String,
    #[serde(default)]
    willing_to_pay: Option<i64>,
    #[serde(default)]
    contact: String,
    #[serde(default)]
    notes: String,
}

/// POST /api/v1/requirement/report
pub async fn handle_report(store: &dyn RequirementStore, req: &HttpRequest) -> Vec<u8> {
    let Ok(body) = serde_json::from_slice::<ReportBody>(&req.body) else {
        return super::bad_request("Invalid request body");
    };
    if body.title.is_empty() || body.content.is_empty() {
        return super::bad_request("Invalid request body");
    }

    let draft = NewRequirement {
        title: body.title,
        content: body.content,
        willing_to_pay: WillingToPay::from_wire(body.willing_to_pay),
        contact: body.contact,
        notes: body.notes,
    };
    if let Err(err) = store.append_requirement(draft).await {
        error!(error = %err, "append requirement failed");
    }
    super::ok_envelope()
}

/// GET /api/v1/requirement/query
pub async fn handle_query(store: &dyn RequirementStore, req: &HttpRequest) -> Vec<u8> {
    let params = http::parse_query_string(&req.query);
    let page = params
        .get("page")
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(1)
        .max(1);
    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(100)
        .clamp(1, 100);
    let filter = RequirementFilter::from_query(
        params
            .get("willing_to_pay")
            .and_then(|value| value.parse::<i64>().ok()),
    );
    let keyword = params.get("keyword").map(String::as_str).unwrap_or("");

    let result = match store.query_requirements(page, limit, filter, keyword).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "query requirements failed");
            RequirementPage {
                data: Vec::new(),
                total: 0,
                page,
                limit,
            }
        }
    };

    let data: Vec<serde_json::Value> = result
        .data
        .into_iter()
        .map(|item| {
            serde_json::json!({
                "id": item.id,
                "title": item.title,
                "content": item.content,
                "willing_to_pay": item.willing_to_pay.as_wire(),
                "contact": item.contact,
                "notes": item.notes,
                "created_at": item.created_at,
                "updated_at": item.updated_at,
            })
        })
        .collect();

    let body = serde_json::json!({
        "code": 0,
        "data": data,
        "total": result.total,
        "page": result.page,
        "limit": result.limit,
    });
    http::build_response(200, &body.to_string())
}
