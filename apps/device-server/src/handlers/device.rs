//! 设备遥测上报与查询。

use dds_protocol::http::{self, HttpRequest};
use dds_storage::{DeviceRegistry, TelemetryStore};
use domain::DataPoint;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::error;

/// 上报请求体。
///
/// `timestamp` 接受任意 JSON 数值，落库前截断为整数秒。
#[derive(Debug, Deserialize)]
struct ReportBody {
    device_id: String,
    timestamp: f64,
    metrics: BTreeMap<String, f64>,
}

/// POST /api/v1/device/report
pub async fn handle_report(
    registry: &DeviceRegistry,
    store: &dyn TelemetryStore,
    req: &HttpRequest,
) -> Vec<u8> {
    let Ok(body) = serde_json::from_slice::<ReportBody>(&req.body) else {
        return super::bad_request("Invalid request body");
    };
    if body.device_id.is_empty() || body.metrics.is_empty() {
        return super::bad_request("Invalid request body");
    }

    registry.ensure_registered(&body.device_id).await;

    let point = DataPoint {
        timestamp: body.timestamp as i64,
        metrics: body.metrics,
    };
    if let Err(err) = store.append(&body.device_id, point).await {
        // 落库失败只记录日志，应答约定不变
        error!(error = %err, device_id = %body.device_id, "append data point failed");
    }
    super::ok_envelope()
}

/// GET /api/v1/device/query
pub async fn handle_query(store: &dyn TelemetryStore, req: &HttpRequest) -> Vec<u8> {
    let params = http::parse_query_string(&req.query);
    let device_id = params.get("device_id").map(String::as_str).unwrap_or("");
    if device_id.is_empty() {
        return super::bad_request("Missing device_id");
    }
    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(100)
        .clamp(1, 1000);

    let points = match store.query_latest(device_id, limit).await {
        Ok(points) => points,
        Err(err) => {
            error!(error = %err, device_id, "query latest failed");
            Vec::new()
        }
    };

    let data: Vec<serde_json::Value> = points
        .into_iter()
        .map(|point| {
            let mut item = serde_json::Map::new();
            item.insert("timestamp".to_string(), point.timestamp.into());
            for (key, value) in point.metrics {
                item.insert(key, serde_json::json!(value));
            }
            serde_json::Value::Object(item)
        })
        .collect();

    let body = serde_json::json!({ "device_id": device_id, "data": data });
    http::build_response(200, &body.to_string())
}
