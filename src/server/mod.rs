mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::search_handler, api::similar_handler, api::scan_handler, api::scan_status_handler),
    components(schemas(
        types::SearchRequest,
        types::SimilarRequest,
        types::ScanRequest,
        types::SearchResponse,
        types::HitEntry,
        types::ScanResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", post(api::search_handler))
        .route("/similar", post(api::similar_handler))
        .route("/scan", post(api::scan_handler).get(api::scan_status_handler))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(DefaultBodyLimit::disable())
        // 请求体限制：1M，只有 JSON 请求
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}
