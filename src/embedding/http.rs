use std::io::Cursor;
use std::time::Duration;

use anyhow::anyhow;
use image::{ImageFormat, RgbImage};
use log::debug;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::BackendError;

/// 通过 HTTP 调用远程嵌入服务
///
/// - `POST {url}/embed/image`，请求体为 PNG 图片
/// - `POST {url}/embed/text`，请求体为 `{"text": "..."}`
///
/// 两个接口都返回 `{"embedding": [f32; D]}`
pub struct HttpEmbedder {
    client: Client,
    url: String,
    dim: usize,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(url: &str, dim: usize) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url: url.trim_end_matches('/').to_string(), dim })
    }

    async fn parse(&self, resp: reqwest::Response) -> Result<Vec<f32>, BackendError> {
        let resp = resp.error_for_status()?;
        let body: EmbeddingResponse = resp.json().await?;
        // 维度不一致是配置错误，重试没有意义
        if body.embedding.len() != self.dim {
            return Err(BackendError::permanent(anyhow!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dim,
                body.embedding.len()
            )));
        }
        Ok(body.embedding)
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, BackendError> {
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || {
            let mut buf = Cursor::new(vec![]);
            image.write_to(&mut buf, ImageFormat::Png).map(|_| buf.into_inner())
        })
        .await
        .map_err(BackendError::permanent)?
        .map_err(BackendError::permanent)?;

        debug!("请求图片嵌入: {} 字节", png.len());
        let resp = self
            .client
            .post(format!("{}/embed/image", self.url))
            .header(CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .await?;
        self.parse(resp).await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        debug!("请求文本嵌入: {text:?}");
        let resp = self
            .client
            .post(format!("{}/embed/text", self.url))
            .json(&TextRequest { text })
            .send()
            .await?;
        self.parse(resp).await
    }
}
