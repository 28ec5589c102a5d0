//! 请求路由：按方法与路径分发到各处理器。

use crate::handlers;
use async_trait::async_trait;
use dds_protocol::http;
use dds_protocol::RequestHandler;
use dds_storage::{DeviceRegistry, RequirementStore, TelemetryStore};
use std::sync::Arc;

/// 服务路由表。
pub struct Router {
    telemetry: Arc<dyn TelemetryStore>,
    requirements: Arc<dyn RequirementStore>,
    registry: Arc<DeviceRegistry>,
}

impl Router {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        requirements: Arc<dyn RequirementStore>,
        registry: Arc<DeviceRegistry>,
    ) -> Self {
        Self {
            telemetry,
            requirements,
            registry,
        }
    }
}

#[async_trait]
impl RequestHandler for Router {
    async fn handle(&self, raw: Vec<u8>) -> Vec<u8> {
        let Some(req) = http::parse_request(&raw) else {
            return http::build_response(400, "{\"code\":400,\"message\":\"Invalid request\"}");
        };
        match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/api/v1/device/report") => {
                handlers::device::handle_report(&self.registry, self.telemetry.as_ref(), &req)
                    .await
            }
            ("GET", "/api/v1/device/query") => {
                handlers::device::handle_query(self.telemetry.as_ref(), &req).await
            }
            ("POST", "/api/v1/requirement/report") => {
                handlers::requirement::handle_report(self.requirements.as_ref(), &req).await
            }
            ("GET", "/api/v1/requirement/query") => {
                handlers::requirement::handle_query(self.requirements.as_ref(), &req).await
            }
            _ => http::build_response(404, "{\"code\":404,\"message\":\"Not found\"}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dds_storage::{MemoryRequirementStore, MemoryTelemetryStore};

    fn memory_router() -> Router {
        Router::new(
            Arc::new(MemoryTelemetryStore::new()),
            Arc::new(MemoryRequirementStore::new()),
            Arc::new(DeviceRegistry::memory()),
        )
    }

    fn raw_request(method: &str, target: &str, body: &str) -> Vec<u8> {
        format!(
            "{} {} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            method,
            target,
            body.len(),
            body
        )
        .into_bytes()
    }

    fn status_of(response: &[u8]) -> u16 {
        let text = std::str::from_utf8(response).expect("utf8");
        text.split(' ').nth(1).expect("status").parse().expect("code")
    }

    fn json_body(response: &[u8]) -> serde_json::Value {
        let text = std::str::from_utf8(response).expect("utf8");
        let body = text.split("\r\n\r\n").nth(1).expect("body");
        serde_json::from_str(body).expect("json body")
    }

    #[tokio::test]
    async fn telemetry_report_then_query_round_trips() {
        let router = memory_router();

        let report = router
            .handle(raw_request(
                "POST",
                "/api/v1/device/report",
                r#"{"device_id":"dev-1","timestamp":1700000000,"metrics":{"cpu":0.5,"mem":42}}"#,
            ))
            .await;
        assert_eq!(status_of(&report), 200);
        assert_eq!(json_body(&report)["code"], 0);
        assert_eq!(json_body(&report)["message"], "ok");

        let query = router
            .handle(raw_request(
                "GET",
                "/api/v1/device/query?device_id=dev-1&limit=10",
                "",
            ))
            .await;
        assert_eq!(status_of(&query), 200);
        let body = json_body(&query);
        assert_eq!(body["device_id"], "dev-1");
        assert_eq!(body["data"][0]["timestamp"], 1700000000i64);
        assert_eq!(body["data"][0]["cpu"], 0.5);
        assert_eq!(body["data"][0]["mem"], 42.0);
    }

    #[tokio::test]
    async fn query_unknown_device_returns_empty_data() {
        let router = memory_router();
        let query = router
            .handle(raw_request(
                "GET",
                "/api/v1/device/query?device_id=ghost&limit=5",
                "",
            ))
            .await;
        let body = json_body(&query);
        assert_eq!(body["device_id"], "ghost");
        assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn report_without_device_id_is_rejected() {
        let router = memory_router();
        let report = router
            .handle(raw_request(
                "POST",
                "/api/v1/device/report",
                r#"{"timestamp":1,"metrics":{"x":1}}"#,
            ))
            .await;
        assert_eq!(status_of(&report), 400);
        assert_eq!(json_body(&report)["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn report_with_empty_metrics_is_rejected() {
        let router = memory_router();
        let report = router
            .handle(raw_request(
                "POST",
                "/api/v1/device/report",
                r#"{"device_id":"dev-1","timestamp":1,"metrics":{}}"#,
            ))
            .await;
        assert_eq!(status_of(&report), 400);
    }

    #[tokio::test]
    async fn device_query_requires_device_id() {
        let router = memory_router();
        let query = router
            .handle(raw_request("GET", "/api/v1/device/query?limit=5", ""))
            .await;
        assert_eq!(status_of(&query), 400);
        assert_eq!(json_body(&query)["message"], "Missing device_id");
    }

    #[tokio::test]
    async fn requirement_round_trip_preserves_fields() {
        let router = memory_router();

        let report = router
            .handle(raw_request(
                "POST",
                "/api/v1/requirement/report",
                r#"{"title":"T","content":"C","willing_to_pay":1,"contact":"me@x","notes":"n"}"#,
            ))
            .await;
        assert_eq!(status_of(&report), 200);

        let query = router
            .handle(raw_request(
                "GET",
                "/api/v1/requirement/query?page=1&limit=10",
                "",
            ))
            .await;
        let body = json_body(&query);
        assert_eq!(body["code"], 0);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["id"], 1);
        assert_eq!(body["data"][0]["title"], "T");
        assert_eq!(body["data"][0]["willing_to_pay"], 1);
        assert_eq!(body["data"][0]["contact"], "me@x");
    }

    #[tokio::test]
    async fn willing_to_pay_filter_selects_tri_state_rows() {
        let router = memory_router();
        for payload in [
            r#"{"title":"a","content":"x","willing_to_pay":1}"#,
            r#"{"title":"b","content":"y","willing_to_pay":0}"#,
            r#"{"title":"c","content":"z","willing_to_pay":null}"#,
        ] {
            let report = router
                .handle(raw_request("POST", "/api/v1/requirement/report", payload))
                .await;
            assert_eq!(status_of(&report), 200);
        }

        let unset = json_body(
            &router
                .handle(raw_request(
                    "GET",
                    "/api/v1/requirement/query?willing_to_pay=2",
                    "",
                ))
                .await,
        );
        assert_eq!(unset["total"], 1);
        assert_eq!(unset["data"][0]["title"], "c");
        assert!(unset["data"][0]["willing_to_pay"].is_null());

        let no = json_body(
            &router
                .handle(raw_request(
                    "GET",
                    "/api/v1/requirement/query?willing_to_pay=0",
                    "",
                ))
                .await,
        );
        assert_eq!(no["total"], 1);
        assert_eq!(no["data"][0]["title"], "b");

        let all = json_body(
            &router
                .handle(raw_request("GET", "/api/v1/requirement/query", ""))
                .await,
        );
        assert_eq!(all["total"], 3);
    }

    #[tokio::test]
    async fn requirement_without_title_is_rejected() {
        let router = memory_router();
        let report = router
            .handle(raw_request(
                "POST",
                "/api/v1/requirement/report",
                r#"{"content":"C"}"#,
            ))
            .await;
        assert_eq!(status_of(&report), 400);
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let router = memory_router();
        let response = router
            .handle(raw_request("GET", "/api/v1/unknown", ""))
            .await;
        assert_eq!(status_of(&response), 404);
        assert_eq!(json_body(&response)["message"], "Not found");
    }

    #[tokio::test]
    async fn malformed_request_line_is_400() {
        let router = memory_router();
        let response = router.handle(b"GARBAGE\r\n\r\n".to_vec()).await;
        assert_eq!(status_of(&response), 400);
        assert_eq!(json_body(&response)["message"], "Invalid request");
    }

    #[tokio::test]
    async fn requirement_limit_is_clamped_to_100() {
        let router = memory_router();
        let body = json_body(
            &router
                .handle(raw_request(
                    "GET",
                    "/api/v1/requirement/query?page=0&limit=5000",
                    "",
                ))
                .await,
        );
        assert_eq!(body["limit"], 100);
        assert_eq!(body["page"], 1);
    }
}
