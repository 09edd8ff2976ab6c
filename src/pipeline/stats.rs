use log::warn;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::model::{LastVector, StatsResponse};

/// 读取向量表的统计信息，表不存在时返回 `NotFound`
pub async fn stats(ctx: &AppContext) -> Result<StatsResponse> {
    let table = ctx.open_table().await?;

    let row_count =
        ctx.retry.run("count rows", || table.count_rows()).await.map_err(Error::Index)?;
    let columns = table.schema().columns();

    // 最后一行向量的维度只是参考信息，读取失败不影响整个请求
    let (last_vector_dim, last_vector_status) =
        match ctx.retry.run("last vector", || table.last_vector()).await {
            Ok(LastVector::Empty) => (None, "empty"),
            Ok(LastVector::Dim(dim)) => (Some(dim), "ok"),
            Ok(LastVector::Malformed) => (None, "malformed"),
            Err(e) => {
                warn!("读取最后一行向量失败: {e}");
                (None, "unavailable")
            }
        };

    let indices =
        ctx.retry.run("list indices", || table.list_indices()).await.map_err(Error::Index)?;

    Ok(StatsResponse {
        row_count,
        column_count: columns.len(),
        columns,
        last_vector_dim,
        last_vector_status: last_vector_status.to_string(),
        table_path: table.uri(),
        indices,
    })
}
