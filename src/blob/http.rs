use std::time::Duration;

use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};

use super::{BlobStore, check_key};
use crate::error::BackendError;

/// 通过 HTTP `PUT`/`GET {url}/{bucket}/{key}` 访问的对象存储
pub struct HttpBlobStore {
    client: Client,
    base: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(url: &str, bucket: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
        let base = format!("{}/{}", url.trim_end_matches('/'), bucket);
        Ok(Self { client, base, token })
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BackendError> {
        check_key(key)?;
        let req = self
            .client
            .put(self.locator(key))
            .header(CONTENT_TYPE, content_type)
            .body(data.to_vec());
        self.auth(req).send().await?.error_for_status()?;
        debug!("上传对象 {} ({} 字节)", key, data.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        check_key(key)?;
        let resp = self.auth(self.client.get(self.locator(key))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let data = resp.error_for_status()?.bytes().await?;
        Ok(Some(data.to_vec()))
    }

    fn locator(&self, key: &str) -> String {
        format!("{}/{}", self.base, key)
    }
}
