use std::sync::LazyLock;

use prometheus::*;

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imvec_ingest_count",
        "count of the ingested images by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("imvec_search_duration", "duration of the text search in seconds").unwrap()
});

static METRIC_SEARCH_RESULTS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imvec_search_results",
        "number of results returned per search",
        vec![0., 1., 2., 3., 5., 10.]
    )
    .unwrap()
});

/// 按结果统计入库次数，`outcome` 为 `inserted`、`duplicate` 或失败阶段名
pub fn inc_ingest(outcome: &str) {
    METRIC_INGEST_COUNT.with_label_values(&[outcome]).inc();
}

/// 记录一次检索的耗时和结果数量
pub fn observe_search(duration: f32, results: usize) {
    METRIC_SEARCH_DURATION.observe(duration as f64);
    METRIC_SEARCH_RESULTS.observe(results as f64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&gather())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_after_use() {
        inc_ingest("inserted");
        observe_search(0.01, 3);
        let text = gather_text().unwrap();
        assert!(text.contains("imvec_ingest_count"));
        assert!(text.contains("imvec_search_duration"));
    }
}
