mod fs;
mod http;

pub use fs::FsBlobStore;
pub use http::HttpBlobStore;

use crate::error::BackendError;

/// 保存原始图片字节的对象存储
///
/// 同一个 key 重复写入相同内容等价于一次写入
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BackendError>;

    /// 读取对象，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// 对象的完整位置，写入向量表的 `path` 列
    fn locator(&self, key: &str) -> String;
}

/// key 只能是若干个 `/` 分隔的普通路径段
fn check_key(key: &str) -> Result<(), BackendError> {
    let valid = !key.is_empty()
        && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && !key.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(BackendError::permanent(anyhow::anyhow!("invalid object key: {key:?}")))
    }
}
