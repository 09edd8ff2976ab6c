use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// 上传图片请求
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    pub file: FieldData<Bytes>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// 上传的图片文件，需要带上文件名和内容类型
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 检索参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// 检索文本
    #[serde(default)]
    pub text: String,
}

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
