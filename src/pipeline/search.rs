use std::collections::HashSet;
use std::time::Instant;

use log::{debug, info};

use crate::context::AppContext;
use crate::error::{BackendError, Error, Result};
use crate::metrics;
use crate::model::{Candidate, SearchHit, SearchResponse};
use crate::utils::l2_normalize;

/// 用一段文本检索最相似的图片，结果按相似度从高到低排列且 id 不重复
pub async fn search(ctx: &AppContext, text: &str) -> Result<SearchResponse> {
    let query = text.trim();
    if query.is_empty() {
        return Err(Error::invalid("search text must not be empty"));
    }

    let start = Instant::now();
    // 表不存在时直接返回，省掉一次嵌入调用
    let table = ctx.open_table().await?;

    let mut vector = ctx
        .retry
        .run("embed text", || ctx.embedder.embed_text(query))
        .await
        .map_err(Error::Embedding)?;
    if !l2_normalize(&mut vector) {
        return Err(Error::Embedding(BackendError::permanent(anyhow::anyhow!(
            "embedding has zero or non-finite norm"
        ))));
    }

    let fetch = ctx.limits.fetch;
    let candidates = ctx
        .retry
        .run("search", || table.search(&vector, fetch))
        .await
        .map_err(Error::Index)?;
    debug!("{query:?}: 向量表返回 {} 个候选", candidates.len());

    let results = dedup_hits(candidates, ctx.limits.count);

    let elapsed = start.elapsed().as_secs_f32();
    metrics::observe_search(elapsed, results.len());
    info!("检索 {query:?}: {} 个结果，{:.2}ms", results.len(), elapsed * 1000.);

    Ok(SearchResponse { query: text.to_string(), results })
}

/// 去掉向量字段，按 id 去重并保持原有顺序，最多保留 `count` 个
pub fn dedup_hits(candidates: Vec<Candidate>, count: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| SearchHit { id: c.id, path: c.path })
        .filter(|hit| seen.insert(hit.id.clone()))
        .take(count)
        .collect()
}
