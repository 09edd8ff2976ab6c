use std::time::Instant;

use image::RgbImage;
use log::{debug, info, warn};

use crate::context::AppContext;
use crate::error::{BackendError, Error, Result};
use crate::metrics;
use crate::model::{ImageRecord, IngestResponse};
use crate::utils::l2_normalize;

/// 声明的内容类型是否为图片，忽略大小写和参数部分
pub fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.len() > "image/".len()
        && essence.get(..6).is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// 解码图片并转换为 RGB 三通道
pub async fn decode_rgb(data: &[u8]) -> Result<RgbImage> {
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || image::load_from_memory(&data).map(|img| img.to_rgb8()))
        .await
        .map_err(|e| Error::invalid(format!("unable to read image: {e}")))?
        .map_err(|e| Error::invalid(format!("unable to read image: {e}")))
}

/// 处理一张上传的图片：校验、计算地址、写入对象存储、计算嵌入、写入向量表
///
/// 对象写入成功后，后续步骤失败不会回滚已写入的对象。
/// 重复检查和插入之间没有互斥，同一张图片并发上传时可能产生重复行。
pub async fn ingest(
    ctx: &AppContext,
    data: &[u8],
    content_type: &str,
    file_name: &str,
) -> Result<IngestResponse> {
    let start = Instant::now();
    let result = ingest_inner(ctx, data, content_type, file_name).await;
    match &result {
        Ok(resp) => {
            let outcome = if resp.inserted { "inserted" } else { "duplicate" };
            metrics::inc_ingest(outcome);
            info!(
                "入库 {} ({}): {:.2}ms",
                resp.id,
                outcome,
                start.elapsed().as_secs_f32() * 1000.
            );
        }
        Err(e) => {
            metrics::inc_ingest(e.stage());
            warn!("入库 {file_name:?} 失败: {e}");
        }
    }
    result
}

async fn ingest_inner(
    ctx: &AppContext,
    data: &[u8],
    content_type: &str,
    file_name: &str,
) -> Result<IngestResponse> {
    if !is_image_content_type(content_type) {
        return Err(Error::invalid("file must be an image"));
    }
    let image = decode_rgb(data).await?;
    debug!("解码图片 {file_name:?}: {}x{}", image.width(), image.height());

    let id = ctx.addresser.address(data, file_name);

    ctx.retry
        .run("blob put", || ctx.blobs.put(&id, data, content_type))
        .await
        .map_err(Error::Storage)?;

    let mut vector = ctx
        .retry
        .run("embed image", || ctx.embedder.embed_image(&image))
        .await
        .map_err(Error::Embedding)?;
    if !l2_normalize(&mut vector) {
        return Err(Error::Embedding(BackendError::permanent(anyhow::anyhow!(
            "embedding has zero or non-finite norm"
        ))));
    }

    let table = ctx.open_or_create_table().await?;
    let exists = ctx
        .retry
        .run("contains", || table.contains(&id))
        .await
        .map_err(Error::Index)?;

    let vector_dim = vector.len();
    if exists {
        debug!("{id} 已存在，跳过插入");
    } else {
        let record = ImageRecord { path: ctx.blobs.locator(&id), id: id.clone(), vector };
        let (table, record) = (&table, &record);
        let mut attempt = 0;
        ctx.retry
            .run("insert", move || {
                attempt += 1;
                let retrying = attempt > 1;
                async move {
                    // 上一次插入可能已经提交，只是超时了
                    if retrying && table.contains(&record.id).await? {
                        return Ok(());
                    }
                    table.insert(record).await
                }
            })
            .await
            .map_err(Error::Index)?;
    }

    Ok(IngestResponse { id, vector_dim, stored: true, inserted: !exists })
}
