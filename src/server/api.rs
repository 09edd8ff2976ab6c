use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum_typed_multipart::TypedMultipart;
use log::info;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::model::{IngestResponse, SearchResponse, StatsResponse};
use crate::{metrics, pipeline};

/// 上传图片，保存原图并写入向量表
#[utoipa::path(
    post,
    path = "/vectorize_and_store",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = IngestResponse),
        (status = 400, description = "不是图片或无法解码"),
        (status = 500, description = "存储、嵌入或向量表写入失败"),
    )
)]
pub async fn vectorize_and_store_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<UploadRequest>,
) -> Result<Json<IngestResponse>> {
    let metadata = &data.file.metadata;
    let content_type = metadata.content_type.as_deref().unwrap_or_default();
    let file_name = metadata.file_name.as_deref().unwrap_or_default();
    info!("收到上传 {file_name:?} ({content_type}, {} 字节)", data.file.contents.len());

    let resp = pipeline::ingest(&state.ctx, &data.file.contents, content_type, file_name).await?;
    Ok(Json(resp))
}

/// 使用文本检索图片
#[utoipa::path(
    get,
    path = "/search",
    params(SearchQuery),
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, description = "检索文本为空"),
        (status = 404, description = "向量表不存在"),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let resp = pipeline::search(&state.ctx, &query.text).await?;
    Ok(Json(resp))
}

/// 获取向量表统计信息
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, body = StatsResponse),
        (status = 404, description = "向量表不存在"),
    )
)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>> {
    let resp = pipeline::stats(&state.ctx).await?;
    Ok(Json(resp))
}

/// 健康检查
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

/// 导出 prometheus 指标
pub async fn metrics_handler() -> Result<impl IntoResponse> {
    let text = metrics::gather_text()?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
