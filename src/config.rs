use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use crate::address::{ContentAddresser, ContentHash};
use crate::blob::{BlobStore, FsBlobStore, HttpBlobStore};
use crate::cli::*;
use crate::context::{AppContext, SearchLimits};
use crate::embedding::HttpEmbedder;
use crate::index::SqliteIndex;
use crate::retry::RetryPolicy;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "aloxaf", "imvec").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct StorageOptions {
    /// 对象存储桶名
    #[arg(long, env = "IMVEC_BUCKET", default_value = "imvec")]
    pub bucket: String,
    /// 图片在桶内的前缀
    #[arg(long, env = "IMVEC_NAMESPACE", default_value = "images")]
    pub namespace: String,
    /// 向量表名
    #[arg(long, env = "IMVEC_TABLE", default_value = "images")]
    pub table: String,
    /// HTTP 对象存储地址，不填则保存到配置目录下的 blobs 目录
    #[arg(long, env = "IMVEC_BLOB_URL", value_name = "URL")]
    pub blob_url: Option<String>,
    /// HTTP 对象存储的 bearer token
    #[arg(long, env = "IMVEC_BLOB_TOKEN", hide_env_values = true)]
    pub blob_token: Option<String>,
    /// 计算图片地址使用的哈希算法，建表后不能更改
    #[arg(short = 'H', long, value_enum, default_value_t = ContentHash::Sha256)]
    pub hash: ContentHash,
}

#[derive(Parser, Debug, Clone)]
pub struct EmbeddingOptions {
    /// 嵌入服务地址
    #[arg(long, env = "IMVEC_EMBEDDING_URL", value_name = "URL", default_value = "http://127.0.0.1:9000")]
    pub embedding_url: String,
    /// 嵌入向量维度，必须与向量表一致
    #[arg(long, value_name = "D", default_value_t = 512)]
    pub dim: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct RetryOptions {
    /// 外部调用最大尝试次数
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub attempts: u32,
    /// 单次外部调用超时，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
    /// 首次重试等待时间，单位为毫秒
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub backoff: u64,
}

impl From<&RetryOptions> for RetryPolicy {
    fn from(opts: &RetryOptions) -> Self {
        Self {
            attempts: opts.attempts,
            timeout: Duration::from_secs(opts.timeout),
            backoff: Duration::from_millis(opts.backoff),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 向向量表请求的候选数量
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub fetch: usize,
    /// 去重后返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 3)]
    pub count: usize,
}

impl From<&SearchOptions> for SearchLimits {
    fn from(opts: &SearchOptions) -> Self {
        Self { fetch: opts.fetch.max(opts.count), count: opts.count }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ServiceOptions {
    #[command(flatten)]
    pub storage: StorageOptions,
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    #[command(flatten)]
    pub retry: RetryOptions,
}

impl ServiceOptions {
    /// 创建服务上下文，只在进程启动时调用一次
    pub async fn open(&self, conf_dir: &ConfDir) -> anyhow::Result<AppContext> {
        let storage = &self.storage;
        crate::index::check_table_name(&storage.table)?;

        let index = SqliteIndex::open(conf_dir.database()).await?;
        let blobs: Arc<dyn BlobStore> = match &storage.blob_url {
            Some(url) => {
                info!("使用 HTTP 对象存储，桶 {}", storage.bucket);
                Arc::new(HttpBlobStore::new(url, &storage.bucket, storage.blob_token.clone())?)
            }
            None => {
                info!("使用本地对象存储: {}", conf_dir.blobs().display());
                Arc::new(FsBlobStore::new(conf_dir.blobs(), &storage.bucket))
            }
        };
        let embedder = HttpEmbedder::new(&self.embedding.embedding_url, self.embedding.dim)?;
        let addresser = ContentAddresser::new(&storage.namespace, storage.hash);

        Ok(AppContext::new(Arc::new(embedder), blobs, Arc::new(index), addresser, &storage.table)
            .with_retry((&self.retry).into()))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imvec", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imvec 配置文件目录
    #[arg(short, long, env = "IMVEC_CONF_DIR", default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 批量添加目录中的图片
    Add(AddCommand),
    /// 使用文本检索图片
    Search(SearchCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 显示向量表统计信息
    Stats(StatsCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imvec.db")
    }

    /// 返回本地对象存储的根目录
    pub fn blobs(&self) -> PathBuf {
        self.path.join("blobs")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let opts = Opts::try_parse_from(["imvec", "-c", "/tmp/imvec", "stats"]).unwrap();
        assert_eq!(opts.conf_dir.database(), PathBuf::from("/tmp/imvec/imvec.db"));
        let SubCommand::Stats(cmd) = opts.subcmd else { panic!("expected stats") };
        assert_eq!(cmd.service.storage.table, "images");
    }

    #[test]
    fn parse_server_options() {
        let opts = Opts::try_parse_from([
            "imvec", "-c", "/tmp/imvec", "server", "--addr", "0.0.0.0:8080", "--dim", "8",
            "--hash", "blake3", "--attempts", "5",
        ])
        .unwrap();
        let SubCommand::Server(cmd) = opts.subcmd else { panic!("expected server") };
        assert_eq!(cmd.addr, "0.0.0.0:8080");
        assert_eq!(cmd.service.embedding.dim, 8);
        assert_eq!(cmd.service.storage.hash, ContentHash::Blake3);
        let policy = RetryPolicy::from(&cmd.service.retry);
        assert_eq!(policy.attempts, 5);
    }
}
