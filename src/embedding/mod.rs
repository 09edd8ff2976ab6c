mod http;

pub use http::HttpEmbedder;
use image::RgbImage;

use crate::error::BackendError;

/// 把图片或文本映射到同一个 D 维语义空间
///
/// 返回的向量不要求已经归一化，调用方负责归一化
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// 向量维度
    fn dim(&self) -> usize;

    async fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, BackendError>;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}
