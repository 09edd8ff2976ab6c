use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use super::{BlobStore, check_key};
use crate::error::BackendError;

/// 以本地目录模拟的对象存储，对象保存在 `<root>/<bucket>/<key>`
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self { root: root.as_ref().join(bucket) }
    }

    fn path(&self, key: &str) -> Result<PathBuf, BackendError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), BackendError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // 先写临时文件再重命名，避免并发写入同一个 key 时读到半个文件
        let tmp = path.with_extension(format!("tmp.{}", rand::random::<u32>()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("写入对象 {} ({} 字节)", key, data.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn locator(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}
