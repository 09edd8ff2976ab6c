#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use imvec::address::{ContentAddresser, ContentHash};
use imvec::blob::{BlobStore, FsBlobStore};
use imvec::embedding::Embedder;
use imvec::index::{SqliteIndex, VectorIndex, VectorTable};
use imvec::model::{Candidate, ImageRecord, IndexInfo, LastVector, TableSchema, TableStatus};
use imvec::retry::RetryPolicy;
use imvec::{AppContext, BackendError};
use tempfile::TempDir;

pub const DIM: usize = 512;

/// 按颜色生成图片嵌入、按关键词生成文本嵌入的测试替身
///
/// 图片向量前三维为平均 RGB，文本中的 dog/red、grass/green、sky/blue 分别对应三个颜色轴
pub struct KeywordEmbedder {
    pub dim: usize,
    pub image_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, image_calls: AtomicUsize::new(0), text_calls: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_image(&self, image: &RgbImage) -> Result<Vec<f32>, BackendError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let n = (image.width() * image.height()).max(1) as f32;
        let mut v = vec![0.; self.dim];
        for px in image.pixels() {
            for c in 0..3 {
                v[c] += px[c] as f32 / n;
            }
        }
        // 故意不归一化
        Ok(v)
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.; self.dim];
        let text = text.to_lowercase();
        let mut matched = false;
        for (axis, words) in [["dog", "red"], ["grass", "green"], ["sky", "blue"]].iter().enumerate()
        {
            if words.iter().any(|w| text.contains(w)) {
                v[axis] = 5.;
                matched = true;
            }
        }
        if !matched {
            v[..3].fill(1.);
        }
        Ok(v)
    }
}

/// 总是失败的嵌入服务
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    async fn embed_image(&self, _image: &RgbImage) -> Result<Vec<f32>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::permanent(anyhow::anyhow!("model crashed")))
    }

    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::permanent(anyhow::anyhow!("model crashed")))
    }
}

/// 前 `transient` 次返回临时错误，之后按 `permanent` 决定是否永久失败
pub struct FlakyBlobStore {
    pub inner: FsBlobStore,
    pub transient: usize,
    pub permanent: bool,
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.permanent {
            return Err(BackendError::permanent(anyhow::anyhow!("access denied")));
        }
        if n < self.transient {
            return Err(BackendError::transient(anyhow::anyhow!("connection reset")));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.get(key).await
    }

    fn locator(&self, key: &str) -> String {
        self.inner.locator(key)
    }
}

/// 包装真实向量表的测试替身，记录检索向量，可以让插入失败或在提交后卡住
#[derive(Default)]
pub struct TableSpy {
    /// 第一次插入提交后等待的时间
    pub stall_first_insert: Option<Duration>,
    pub fail_insert: bool,
    pub stalled: AtomicBool,
    pub inserts: AtomicUsize,
    pub queries: Mutex<Vec<Vec<f32>>>,
}

pub struct SpyIndex {
    pub inner: SqliteIndex,
    pub spy: Arc<TableSpy>,
}

impl SpyIndex {
    fn wrap(&self, inner: Arc<dyn VectorTable>) -> Arc<dyn VectorTable> {
        Arc::new(SpyTable { inner, spy: self.spy.clone() })
    }
}

#[async_trait::async_trait]
impl VectorIndex for SpyIndex {
    async fn open_table(&self, name: &str) -> Result<Option<Arc<dyn VectorTable>>, BackendError> {
        Ok(self.inner.open_table(name).await?.map(|table| self.wrap(table)))
    }

    async fn exists_or_create(
        &self,
        name: &str,
        schema: TableSchema,
    ) -> Result<(Arc<dyn VectorTable>, TableStatus), BackendError> {
        let (table, status) = self.inner.exists_or_create(name, schema).await?;
        Ok((self.wrap(table), status))
    }
}

struct SpyTable {
    inner: Arc<dyn VectorTable>,
    spy: Arc<TableSpy>,
}

#[async_trait::async_trait]
impl VectorTable for SpyTable {
    fn schema(&self) -> TableSchema {
        self.inner.schema()
    }

    fn uri(&self) -> String {
        self.inner.uri()
    }

    async fn contains(&self, id: &str) -> Result<bool, BackendError> {
        self.inner.contains(id).await
    }

    async fn insert(&self, record: &ImageRecord) -> Result<(), BackendError> {
        self.spy.inserts.fetch_add(1, Ordering::SeqCst);
        if self.spy.fail_insert {
            return Err(BackendError::permanent(anyhow::anyhow!("disk full")));
        }
        self.inner.insert(record).await?;
        if let Some(stall) = self.spy.stall_first_insert {
            if !self.spy.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(stall).await;
            }
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>, BackendError> {
        self.spy.queries.lock().unwrap().push(query.to_vec());
        self.inner.search(query, limit).await
    }

    async fn count_rows(&self) -> Result<u64, BackendError> {
        self.inner.count_rows().await
    }

    async fn last_vector(&self) -> Result<LastVector, BackendError> {
        self.inner.last_vector().await
    }

    async fn list_indices(&self) -> Result<Vec<IndexInfo>, BackendError> {
        self.inner.list_indices().await
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.inner.flush().await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub ctx: AppContext,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy { attempts: 3, timeout: Duration::from_secs(10), backoff: Duration::from_millis(1) }
}

pub fn fs_blobs(dir: &TempDir) -> FsBlobStore {
    FsBlobStore::new(dir.path().join("blobs"), "bucket")
}

/// 在 `dir` 中创建服务上下文
pub async fn context_in(
    dir: &TempDir,
    embedder: Arc<dyn Embedder>,
    blobs: Arc<dyn BlobStore>,
    hash: ContentHash,
    index: impl FnOnce(SqliteIndex) -> Arc<dyn VectorIndex>,
) -> AppContext {
    let sqlite = SqliteIndex::open(dir.path().join("imvec.db")).await.unwrap();
    AppContext::new(embedder, blobs, index(sqlite), ContentAddresser::new("images", hash), "images")
        .with_retry(fast_retry())
}

/// 在临时目录中创建服务上下文
pub async fn harness_with(
    embedder: Arc<dyn Embedder>,
    blobs: impl FnOnce(&TempDir) -> Arc<dyn BlobStore>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let blobs = blobs(&dir);
    let ctx = context_in(&dir, embedder, blobs, ContentHash::Sha256, |sqlite| Arc::new(sqlite)).await;
    Harness { dir, ctx }
}

/// 向量表外面包一层 [`TableSpy`]
pub async fn harness_with_spy(spy: Arc<TableSpy>) -> Harness {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(fs_blobs(&dir));
    let embedder = Arc::new(KeywordEmbedder::new(DIM));
    let ctx = context_in(&dir, embedder, blobs, ContentHash::Sha256, |inner| {
        Arc::new(SpyIndex { inner, spy })
    })
    .await;
    Harness { dir, ctx }
}

pub async fn harness() -> Harness {
    harness_with(Arc::new(KeywordEmbedder::new(DIM)), |dir| Arc::new(fs_blobs(dir))).await
}

/// 生成纯色 PNG 图片
pub fn png(color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(8, 8, Rgb(color));
    let mut buf = Cursor::new(vec![]);
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// 十六进制 sha256
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    format!("{:x}", sha2::Sha256::digest(data))
}
