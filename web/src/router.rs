use crate::controller::{health_check_controller, session_controller};
use crate::sse::handler;
use crate::{params, AppState};
use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

// This is the global definition of our OpenAPI document. To be a part
// of the rendered document, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "SSE Gateway API"
        ),
        paths(
            handler::stream,
            handler::poll,
            handler::publish,
            handler::enqueue,
            handler::demo,
            health_check_controller::health_check,
            session_controller::index,
        ),
        components(
            schemas(
                params::sse::EnqueueParams,
                handler::Queued,
                session_controller::SessionsSummary,
            )
        ),
        tags(
            (name = "sse_gateway", description = "Server-Sent Events gateway over a pub/sub broker")
        )
    )]
pub(crate) struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(sse_routes(app_state.clone()))
        .merge(session_routes(app_state))
        .merge(health_routes())
        .merge(api_doc_routes())
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse/stream", get(handler::stream))
        .route("/sse/poll", get(handler::poll))
        .route("/sse/publish", get(handler::publish))
        .route("/sse/queue", post(handler::enqueue))
        .route("/sse/demo", get(handler::demo))
        .with_state(app_state)
}

fn session_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sessions", get(session_controller::index))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn api_doc_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
