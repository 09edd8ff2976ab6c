//! 向量表的 SQL 操作
//!
//! 表名无法作为参数绑定，调用方必须保证传入的表名已经过校验

use sqlx::{Result, SqlitePool};

use super::{IndexListRecord, TableRecord, VectorRow};

/// 查询表在目录中的记录，表不存在时返回 None
pub async fn get_table(executor: &SqlitePool, table: &str) -> Result<Option<TableRecord>> {
    sqlx::query_as("SELECT dim, hash, ann_rowid FROM vector_tables WHERE name = ?")
        .bind(table)
        .fetch_optional(executor)
        .await
}

/// 记录近似索引文件已经覆盖到的 rowid
pub async fn set_ann_rowid(executor: &SqlitePool, table: &str, rowid: i64) -> Result<()> {
    sqlx::query("UPDATE vector_tables SET ann_rowid = ? WHERE name = ?")
        .bind(rowid)
        .bind(table)
        .execute(executor)
        .await?;
    Ok(())
}

/// 创建向量表，返回是否为本次新建
///
/// 表上的 id 索引不是唯一索引，重复检查由上层负责
pub async fn create_table(
    executor: &SqlitePool,
    table: &str,
    dim: i64,
    hash: &str,
) -> Result<bool> {
    let mut tx = executor.begin().await?;
    let created =
        sqlx::query("INSERT OR IGNORE INTO vector_tables (name, dim, hash) VALUES (?, ?, ?)")
            .bind(table)
            .bind(dim)
            .bind(hash)
            .execute(&mut *tx)
        .await?
        .rows_affected()
        == 1;
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT NOT NULL,
            path TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!(r#"CREATE INDEX IF NOT EXISTS "{table}_id_idx" ON "{table}" (id)"#))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(created)
}

/// 检查 id 是否已存在
pub async fn contains_id(executor: &SqlitePool, table: &str, id: &str) -> Result<bool> {
    sqlx::query_scalar(&format!(r#"SELECT EXISTS (SELECT 1 FROM "{table}" WHERE id = ?)"#))
        .bind(id)
        .fetch_one(executor)
        .await
}

/// 插入一行
pub async fn insert_vector(
    executor: &SqlitePool,
    table: &str,
    id: &str,
    path: &str,
    vector: &[u8],
) -> Result<()> {
    sqlx::query(&format!(r#"INSERT INTO "{table}" (id, path, vector) VALUES (?, ?, ?)"#))
        .bind(id)
        .bind(path)
        .bind(vector)
        .execute(executor)
        .await?;
    Ok(())
}

/// 按插入顺序读取 rowid 大于 `after` 的最多 `limit` 个向量
pub async fn get_vectors_after(
    executor: &SqlitePool,
    table: &str,
    after: i64,
    limit: i64,
) -> Result<Vec<(i64, Vec<u8>)>> {
    sqlx::query_as(&format!(
        r#"SELECT rowid, vector FROM "{table}" WHERE rowid > ? ORDER BY rowid ASC LIMIT ?"#
    ))
    .bind(after)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// 按 rowid 读取若干行，结果按 rowid 排序
pub async fn get_rows(executor: &SqlitePool, table: &str, rowids: &[i64]) -> Result<Vec<VectorRow>> {
    if rowids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = vec!["?"; rowids.len()].join(", ");
    let sql = format!(
        r#"SELECT rowid, id, path, vector FROM "{table}" WHERE rowid IN ({placeholders}) ORDER BY rowid ASC"#
    );
    let mut query = sqlx::query_as(&sql);
    for rowid in rowids {
        query = query.bind(*rowid);
    }
    query.fetch_all(executor).await
}

/// 表中的行数
pub async fn count_rows(executor: &SqlitePool, table: &str) -> Result<i64> {
    sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{table}""#)).fetch_one(executor).await
}

/// 最后插入的一行向量
pub async fn get_last_vector(executor: &SqlitePool, table: &str) -> Result<Option<Vec<u8>>> {
    sqlx::query_scalar(&format!(r#"SELECT vector FROM "{table}" ORDER BY rowid DESC LIMIT 1"#))
        .fetch_optional(executor)
        .await
}

/// 列出表上的索引及其覆盖的列
pub async fn list_indices(
    executor: &SqlitePool,
    table: &str,
) -> Result<Vec<(IndexListRecord, Vec<String>)>> {
    let indices: Vec<IndexListRecord> =
        sqlx::query_as(&format!(r#"SELECT name, "unique" FROM pragma_index_list('{table}')"#))
            .fetch_all(executor)
            .await?;
    let mut result = Vec::with_capacity(indices.len());
    for index in indices {
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM pragma_index_info(?) WHERE name IS NOT NULL ORDER BY seqno",
        )
        .bind(&index.name)
        .fetch_all(executor)
        .await?;
        result.push((index, columns));
    }
    Ok(result)
}
