use crate::controller::ApiResponse;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

/// Live SSE connections, in total and per broker channel.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct SessionsSummary {
    active: usize,
    polling: usize,
    channels: HashMap<String, usize>,
}

/// GET a summary of the live SSE sessions
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Successfully summarized live sessions", body = SessionsSummary),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn index(State(app_state): State<AppState>) -> impl IntoResponse {
    let registry = app_state.sse_manager.registry();
    let summary = SessionsSummary {
        active: registry.active_count(),
        polling: registry.polling_count(),
        channels: registry.channel_counts(),
    };

    debug!("GET sessions: {} active", summary.active);

    Json(ApiResponse::new(StatusCode::OK.into(), summary))
}

#[cfg(test)]
mod tests {
    use crate::router::define_routes;
    use crate::AppState;
    use axum::body::Body;
    use axum::http::{header::ACCEPT, Request, StatusCode};
    use broker::MemoryBroker;
    use clap::Parser;
    use serde_json::json;
    use service::config::Config;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_index_counts_sessions_per_channel() {
        let app_state = AppState::new(
            Config::parse_from(["sse_gateway"]),
            Arc::new(MemoryBroker::new()),
        );
        let router = define_routes(app_state);

        let mut streams = Vec::new();
        for uri in ["/sse/stream", "/sse/stream", "/sse/stream?channel=news", "/sse/poll"] {
            let request = Request::builder()
                .uri(uri)
                .header(ACCEPT, "text/event-stream")
                .body(Body::empty())
                .unwrap();
            streams.push(router.clone().oneshot(request).await.unwrap());
        }

        let request = Request::builder()
            .uri("/sessions")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "status_code": 200,
                "data": {
                    "active": 4,
                    "polling": 1,
                    "channels": {"default": 2, "news": 1}
                }
            })
        );
    }
}
