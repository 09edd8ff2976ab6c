use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .expect("invalid progress bar template")
}

/// 原地归一化为单位长度，范数为 0 或不是有限值时返回 false
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm == 0. {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
}

/// 内积，对单位向量来说即余弦相似度
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 将向量转换为本机字节序的字节
pub fn vector_as_bytes(v: &[f32]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// 从字节还原向量，长度不是 4 的倍数时返回 None
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    // NOTE: 数据库返回的缓冲区不保证按 f32 对齐，不能直接 cast_slice
    Some(bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>).collect())
}
