use axum::http::{header, HeaderValue, Method};
use log::*;
use service::config::Config;
use service::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use self::error::{Error, Result};

mod controller;
mod error;
mod params;
pub mod router;
mod sse;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let host = app_state.config.interface.as_deref().unwrap_or("127.0.0.1");
    let server_url = format!("{host}:{}", app_state.config.port);
    let listener = TcpListener::bind(&server_url).await?;

    let cors = cors_layer(&app_state.config);
    let sse_manager = Arc::clone(&app_state.sse_manager);
    let app = router::define_routes(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Server starting... listening for connections on http://{server_url}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sse_manager))
        .await
}

/// Resolves on Ctrl-C, after every live stream has been told to close so the
/// server can drain its connections.
async fn shutdown_signal(sse_manager: Arc<::sse::Manager>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for the shutdown signal: {e}"),
    }
    sse_manager.shutdown();
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::CACHE_CONTROL])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use broker::MemoryBroker;
    use clap::Parser;
    use tower::ServiceExt;

    fn app(allowed_origins: &str) -> axum::Router {
        let config = Config::parse_from(["sse_gateway", "--allowed-origins", allowed_origins]);
        let layer = cors_layer(&config);
        router::define_routes(AppState::new(config, Arc::new(MemoryBroker::new()))).layer(layer)
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app("http://localhost:3000,http://example.com")
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_cors_omits_header_for_unknown_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app("http://localhost:3000").oneshot(request).await.unwrap();

        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
