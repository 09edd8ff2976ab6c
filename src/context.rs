use std::sync::Arc;

use log::{debug, info};
use tokio::sync::OnceCell;

use crate::address::ContentAddresser;
use crate::blob::BlobStore;
use crate::embedding::Embedder;
use crate::error::{BackendError, Error, Result};
use crate::index::{VectorIndex, VectorTable};
use crate::model::{TableSchema, TableStatus};
use crate::retry::RetryPolicy;

/// 检索时的候选数量和结果数量
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// 向向量表请求的候选数量，多取一些以应对重复 id
    pub fetch: usize,
    /// 去重后最多返回的结果数量
    pub count: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self { fetch: 10, count: 3 }
    }
}

/// 进程启动时创建一次的服务上下文，所有请求共享
pub struct AppContext {
    pub embedder: Arc<dyn Embedder>,
    pub blobs: Arc<dyn BlobStore>,
    pub index: Arc<dyn VectorIndex>,
    pub addresser: ContentAddresser,
    /// 向量表名
    pub table: String,
    pub retry: RetryPolicy,
    pub limits: SearchLimits,
    /// 确认存在后缓存的表句柄
    handle: OnceCell<Arc<dyn VectorTable>>,
}

impl AppContext {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        addresser: ContentAddresser,
        table: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            blobs,
            index,
            addresser,
            table: table.into(),
            retry: RetryPolicy::default(),
            limits: SearchLimits::default(),
            handle: OnceCell::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 表结构由嵌入维度和地址哈希算法决定
    pub fn schema(&self) -> TableSchema {
        TableSchema { dim: self.embedder.dim(), hash: self.addresser.hash() }
    }

    /// 打开已有的表，不存在时返回 `NotFound`
    pub async fn open_table(&self) -> Result<Arc<dyn VectorTable>> {
        if let Some(table) = self.handle.get() {
            return Ok(table.clone());
        }
        let table = self
            .retry
            .run("open table", || self.index.open_table(&self.table))
            .await
            .map_err(Error::Index)?
            .ok_or_else(|| Error::NotFound(self.table.clone()))?;
        Ok(self.handle.get_or_init(|| async { table }).await.clone())
    }

    /// 打开表，不存在时创建
    ///
    /// 已有的表必须与当前配置的结构一致
    pub async fn open_or_create_table(&self) -> Result<Arc<dyn VectorTable>> {
        let schema = self.schema();
        if let Some(table) = self.handle.get() {
            // 句柄可能是检索时按目录里的结构打开的
            if table.schema() != schema {
                return Err(Error::Index(BackendError::permanent(anyhow::anyhow!(
                    "table {} has schema {:?}, but {:?} is configured",
                    self.table,
                    table.schema(),
                    schema
                ))));
            }
            return Ok(table.clone());
        }
        let (table, status) = self
            .retry
            .run("create table", || self.index.exists_or_create(&self.table, schema))
            .await
            .map_err(Error::Index)?;
        match status {
            TableStatus::Created => info!("向量表 {} 已创建", table.uri()),
            TableStatus::Existing => debug!("打开向量表 {}", table.uri()),
        }
        Ok(self.handle.get_or_init(|| async { table }).await.clone())
    }

    /// 把向量表的近似索引落盘，表还没打开过时什么也不做
    pub async fn flush(&self) -> Result<()> {
        match self.handle.get() {
            Some(table) => table.flush().await.map_err(Error::Index),
            None => Ok(()),
        }
    }
}
