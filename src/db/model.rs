/// `vector_tables` 目录中的一行
#[derive(sqlx::FromRow)]
pub struct TableRecord {
    pub dim: i64,
    pub hash: String,
    /// 已经写入近似索引文件的最大 rowid
    pub ann_rowid: i64,
}

/// 向量表中的一行
#[derive(sqlx::FromRow)]
pub struct VectorRow {
    pub rowid: i64,
    /// 图片内容地址
    pub id: String,
    /// 图片存储位置
    pub path: String,
    /// 原始向量字节，f32 本机字节序
    pub vector: Vec<u8>,
}

/// `PRAGMA index_list` 的一行
#[derive(sqlx::FromRow)]
pub struct IndexListRecord {
    pub name: String,
    pub unique: bool,
}
