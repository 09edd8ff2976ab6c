mod ann;
mod sqlite;

use std::sync::Arc;

pub use sqlite::{SqliteIndex, SqliteTable, check_table_name};

use crate::error::BackendError;
use crate::model::{Candidate, ImageRecord, IndexInfo, LastVector, TableSchema, TableStatus};

/// 保存向量表的存储后端
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// 打开已有的表，不存在时返回 None
    async fn open_table(&self, name: &str) -> Result<Option<Arc<dyn VectorTable>>, BackendError>;

    /// 打开表，不存在时按给定结构创建
    async fn exists_or_create(
        &self,
        name: &str,
        schema: TableSchema,
    ) -> Result<(Arc<dyn VectorTable>, TableStatus), BackendError>;
}

/// 一张 `{id, path, vector}` 向量表的句柄
///
/// 句柄本身没有请求级别的可变状态，可以在请求之间共享；
/// 每个方法都是一次独立的存储往返
#[async_trait::async_trait]
pub trait VectorTable: Send + Sync {
    fn schema(&self) -> TableSchema;

    /// 表的完整位置
    fn uri(&self) -> String;

    async fn contains(&self, id: &str) -> Result<bool, BackendError>;

    /// 无条件插入一行，不做去重
    async fn insert(&self, record: &ImageRecord) -> Result<(), BackendError>;

    /// 按余弦距离从小到大返回最多 `limit` 个近似最近邻候选，距离相同时保持表中的原始顺序
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>, BackendError>;

    async fn count_rows(&self) -> Result<u64, BackendError>;

    async fn last_vector(&self) -> Result<LastVector, BackendError>;

    async fn list_indices(&self) -> Result<Vec<IndexInfo>, BackendError>;

    /// 持久化检索用的派生索引，没有派生索引的实现什么也不做
    async fn flush(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
