use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::address::ContentHash;

/// 向量表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// 内容地址 `<namespace>/<digest><.ext>`
    pub id: String,
    /// 原图在对象存储中的完整位置
    pub path: String,
    /// 单位长度的嵌入向量
    pub vector: Vec<f32>,
}

/// 向量表结构，建表后不再改变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub dim: usize,
    /// 表中 id 使用的哈希算法，换算法后同一张图片会得到不同的 id
    pub hash: ContentHash,
}

impl TableSchema {
    /// 列名到类型的映射
    pub fn columns(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("id".to_string(), "string".to_string()),
            ("path".to_string(), "string".to_string()),
            ("vector".to_string(), format!("fixed_size_list<float>[{}]", self.dim)),
        ])
    }
}

/// `exists_or_create` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Existing,
    Created,
}

/// 相似度检索的候选行，带有向量
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub path: String,
    pub vector: Vec<f32>,
    /// 余弦距离，越小越相似
    pub distance: f32,
}

/// 最后一行向量的检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastVector {
    /// 表中还没有数据
    Empty,
    /// 最后一行向量的维度
    Dim(usize),
    /// 最后一行的向量无法解析
    Malformed,
}

/// 表上维护的索引
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// 入库结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// 图片内容地址
    pub id: String,
    /// 嵌入向量维度
    pub vector_dim: usize,
    pub stored: bool,
    /// 本次是否新插入了一行（重复上传时为 false）
    #[serde(skip)]
    pub inserted: bool,
}

/// 单条检索结果，不包含向量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SearchHit {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub row_count: u64,
    pub column_count: usize,
    pub columns: BTreeMap<String, String>,
    /// 最后一行向量的维度，表为空或数据异常时为 null
    pub last_vector_dim: Option<usize>,
    /// `empty` | `ok` | `malformed` | `unavailable`
    pub last_vector_status: String,
    pub table_path: String,
    pub indices: Vec<IndexInfo>,
}
