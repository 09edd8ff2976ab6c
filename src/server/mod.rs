mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::vectorize_and_store_handler,
        api::search_handler,
        api::stats_handler,
        api::health_handler,
    ),
    components(schemas(
        types::UploadForm,
        types::HealthResponse,
        crate::model::IngestResponse,
        crate::model::SearchResponse,
        crate::model::SearchHit,
        crate::model::StatsResponse,
        crate::model::IndexInfo,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/vectorize_and_store", post(api::vectorize_and_store_handler))
        .route("/search", get(api::search_handler))
        .route("/stats", get(api::stats_handler))
        .route("/health", get(api::health_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
