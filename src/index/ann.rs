//! 向量表的近似最近邻索引
//!
//! 索引以 SQLite rowid 为 key，是表数据的派生缓存。表中的行只会追加，
//! 所以只需要记住已经加入索引的最大 rowid，检索前把之后的新行补进来。
//! 落盘时先写索引文件，再把对应的 rowid 写回目录，中途失败最多导致下次重复补录。

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::anyhow;
use log::{info, warn};
use tokio::sync::Mutex;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::BackendError;
use crate::utils::vector_from_bytes;

pub struct AnnState {
    /// 已经加入索引的最大 rowid
    pub synced: i64,
    /// 索引文件覆盖到的最大 rowid
    pub saved: i64,
}

pub struct AnnIndex {
    index: RwLock<Index>,
    dim: usize,
    path: PathBuf,
    /// 补录和落盘都要持有这把锁
    pub state: Mutex<AnnState>,
}

fn new_index(dim: usize) -> Result<Index, BackendError> {
    let options = IndexOptions {
        dimensions: dim,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: 32,
        expansion_add: 128,
        expansion_search: 64,
        ..Default::default()
    };
    Index::new(&options).map_err(BackendError::permanent)
}

fn path_str(path: &Path) -> Result<&str, BackendError> {
    path.to_str()
        .ok_or_else(|| BackendError::permanent(anyhow!("non-utf8 path: {}", path.display())))
}

fn poisoned<T>(_: PoisonError<T>) -> BackendError {
    BackendError::permanent(anyhow!("ann index lock poisoned"))
}

impl AnnIndex {
    /// 载入索引文件，`saved` 为目录中记录的 rowid
    ///
    /// 文件不存在、损坏或维度不对时从空索引开始，由之后的补录重建
    pub fn open(path: PathBuf, dim: usize, saved: i64) -> Result<Self, BackendError> {
        let mut index = new_index(dim)?;
        let mut saved = saved;
        if path.is_file() {
            match index.load(path_str(&path)?) {
                Ok(()) if index.dimensions() == dim => {
                    info!("载入近似索引 {}: {} 个向量", path.display(), index.size());
                }
                Ok(()) => {
                    warn!("近似索引 {} 维度为 {}，重新构建", path.display(), index.dimensions());
                    index = new_index(dim)?;
                    saved = 0;
                }
                Err(e) => {
                    warn!("载入近似索引 {} 失败，重新构建: {e}", path.display());
                    index = new_index(dim)?;
                    saved = 0;
                }
            }
        } else {
            saved = 0;
        }
        Ok(Self {
            index: RwLock::new(index),
            dim,
            path,
            state: Mutex::new(AnnState { synced: saved, saved }),
        })
    }

    /// 加入一批 `(rowid, 向量字节)`，返回实际加入的数量
    ///
    /// 已经在索引中的 rowid 和格式错误的向量会被跳过
    pub fn add(&self, rows: Vec<(i64, Vec<u8>)>) -> Result<usize, BackendError> {
        let index = self.index.write().map_err(poisoned)?;
        let wanted = index.size() + rows.len();
        if wanted > index.capacity() {
            index.reserve(wanted.max(index.capacity() * 2)).map_err(BackendError::permanent)?;
        }
        let mut added = 0;
        for (rowid, bytes) in rows {
            let key = rowid as u64;
            match vector_from_bytes(&bytes) {
                Some(v) if v.len() == self.dim => {
                    if !index.contains(key) {
                        index.add(key, v.as_slice()).map_err(BackendError::permanent)?;
                        added += 1;
                    }
                }
                _ => warn!("跳过格式错误的向量: rowid {rowid}"),
            }
        }
        Ok(added)
    }

    /// 返回最接近的最多 `count` 个 rowid
    pub fn search(&self, query: &[f32], count: usize) -> Result<Vec<i64>, BackendError> {
        let index = self.index.read().map_err(poisoned)?;
        if index.size() == 0 || count == 0 {
            return Ok(vec![]);
        }
        let matches = index.search(query, count).map_err(BackendError::permanent)?;
        Ok(matches.keys.into_iter().map(|key| key as i64).collect())
    }

    pub fn size(&self) -> Result<usize, BackendError> {
        Ok(self.index.read().map_err(poisoned)?.size())
    }

    /// 写入临时文件后重命名
    pub fn save(&self) -> Result<(), BackendError> {
        let tmp = self.path.with_extension("usearch.tmp");
        self.index.read().map_err(poisoned)?.save(path_str(&tmp)?).map_err(BackendError::permanent)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
