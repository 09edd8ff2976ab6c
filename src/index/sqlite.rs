use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::anyhow;
use log::{debug, info};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use super::ann::{AnnIndex, AnnState};
use super::{VectorIndex, VectorTable};
use crate::address::ContentHash;
use crate::db::{self, Database, TableRecord, crud};
use crate::error::BackendError;
use crate::model::{Candidate, ImageRecord, IndexInfo, LastVector, TableSchema, TableStatus};
use crate::utils::{dot, vector_as_bytes, vector_from_bytes};

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("failed to build regex"));

/// 检查表名，表名会直接拼接进 SQL
pub fn check_table_name(name: &str) -> Result<(), BackendError> {
    if TABLE_NAME.is_match(name) && !name.starts_with("sqlite_") && name != "vector_tables" {
        Ok(())
    } else {
        Err(BackendError::permanent(anyhow!("invalid table name: {name:?}")))
    }
}

/// 每批补录进近似索引的行数
const SYNC_BATCH: i64 = 1024;

/// 基于 SQLite 的向量表，行数据保存在 SQLite，检索走 usearch 近似索引
pub struct SqliteIndex {
    db: Database,
    path: PathBuf,
    /// 每张表的近似索引，同一进程内的表句柄共享
    anns: Mutex<HashMap<String, Arc<AnnIndex>>>,
}

impl SqliteIndex {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = db::init_db(&path).await?;
        Ok(Self { db, path, anns: Mutex::new(HashMap::new()) })
    }

    /// 近似索引文件保存在数据库文件旁边
    fn ann_path(&self, name: &str) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(format!(".{name}.usearch"));
        PathBuf::from(path)
    }

    async fn ann(&self, name: &str, dim: usize, saved: i64) -> Result<Arc<AnnIndex>, BackendError> {
        let mut anns = self.anns.lock().await;
        if let Some(ann) = anns.get(name) {
            return Ok(ann.clone());
        }
        let path = self.ann_path(name);
        let ann = spawn_blocking(move || AnnIndex::open(path, dim, saved))
            .await
            .map_err(BackendError::permanent)??;
        let ann = Arc::new(ann);
        anns.insert(name.to_string(), ann.clone());
        Ok(ann)
    }

    async fn table(
        &self,
        name: &str,
        record: TableRecord,
    ) -> Result<Arc<dyn VectorTable>, BackendError> {
        let dim = usize::try_from(record.dim).map_err(|_| {
            BackendError::permanent(anyhow!("table {name} has invalid dim {}", record.dim))
        })?;
        let hash = ContentHash::parse(&record.hash).ok_or_else(|| {
            BackendError::permanent(anyhow!("table {name} has unknown hash {:?}", record.hash))
        })?;
        let ann = self.ann(name, dim, record.ann_rowid).await?;
        Ok(Arc::new(SqliteTable {
            db: self.db.clone(),
            name: name.to_string(),
            schema: TableSchema { dim, hash },
            uri: format!("sqlite://{}#{}", self.path.display(), name),
            ann,
        }))
    }
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    async fn open_table(&self, name: &str) -> Result<Option<Arc<dyn VectorTable>>, BackendError> {
        check_table_name(name)?;
        match crud::get_table(&self.db, name).await? {
            Some(record) => Ok(Some(self.table(name, record).await?)),
            None => Ok(None),
        }
    }

    async fn exists_or_create(
        &self,
        name: &str,
        schema: TableSchema,
    ) -> Result<(Arc<dyn VectorTable>, TableStatus), BackendError> {
        check_table_name(name)?;
        let created =
            crud::create_table(&self.db, name, schema.dim as i64, schema.hash.name()).await?;
        let status = match created {
            true => {
                info!("创建向量表 {name}，维度 {}，哈希 {}", schema.dim, schema.hash.name());
                TableStatus::Created
            }
            false => TableStatus::Existing,
        };
        let record = crud::get_table(&self.db, name)
            .await?
            .ok_or_else(|| BackendError::transient(anyhow!("table {name} vanished")))?;
        if record.dim as usize != schema.dim {
            return Err(BackendError::permanent(anyhow!(
                "table {name} has dimension {}, but {} is configured",
                record.dim,
                schema.dim
            )));
        }
        if record.hash != schema.hash.name() {
            return Err(BackendError::permanent(anyhow!(
                "table {name} addresses images with {}, but {} is configured",
                record.hash,
                schema.hash.name()
            )));
        }
        Ok((self.table(name, record).await?, status))
    }
}

pub struct SqliteTable {
    db: Database,
    name: String,
    schema: TableSchema,
    uri: String,
    ann: Arc<AnnIndex>,
}

impl SqliteTable {
    fn check_dim(&self, v: &[f32]) -> Result<(), BackendError> {
        if v.len() == self.schema.dim {
            Ok(())
        } else {
            Err(BackendError::permanent(anyhow!(
                "vector dimension {} does not match table dimension {}",
                v.len(),
                self.schema.dim
            )))
        }
    }

    /// 把 `state.synced` 之后插入的行补进近似索引
    async fn sync(&self, state: &mut AnnState) -> Result<(), BackendError> {
        let mut added = 0;
        loop {
            let rows =
                crud::get_vectors_after(&self.db, &self.name, state.synced, SYNC_BATCH).await?;
            let Some(&(last, _)) = rows.last() else { break };
            let full = rows.len() as i64 == SYNC_BATCH;
            let ann = self.ann.clone();
            added += spawn_blocking(move || ann.add(rows)).await.map_err(BackendError::permanent)??;
            state.synced = last;
            if !full {
                break;
            }
        }
        if added > 0 {
            debug!("{}: {added} 行加入近似索引", self.name);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorTable for SqliteTable {
    fn schema(&self) -> TableSchema {
        self.schema
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    async fn contains(&self, id: &str) -> Result<bool, BackendError> {
        Ok(crud::contains_id(&self.db, &self.name, id).await?)
    }

    async fn insert(&self, record: &ImageRecord) -> Result<(), BackendError> {
        self.check_dim(&record.vector)?;
        crud::insert_vector(
            &self.db,
            &self.name,
            &record.id,
            &record.path,
            vector_as_bytes(&record.vector),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>, BackendError> {
        self.check_dim(query)?;
        self.sync(&mut *self.ann.state.lock().await).await?;

        let rowids = self.ann.search(query, limit)?;
        let rows = crud::get_rows(&self.db, &self.name, &rowids).await?;
        debug!("近似索引返回 {} 个候选", rows.len());

        // 按精确的余弦距离重排，行按 rowid 读出，稳定排序让距离相同的行保持插入顺序
        let mut candidates = rows
            .into_iter()
            .filter_map(|row| match vector_from_bytes(&row.vector) {
                Some(vector) if vector.len() == query.len() => {
                    let distance = 1. - dot(query, &vector);
                    Some(Candidate { id: row.id, path: row.path, vector, distance })
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count_rows(&self) -> Result<u64, BackendError> {
        Ok(crud::count_rows(&self.db, &self.name).await? as u64)
    }

    async fn last_vector(&self) -> Result<LastVector, BackendError> {
        let last = crud::get_last_vector(&self.db, &self.name).await?;
        Ok(match last {
            None => LastVector::Empty,
            Some(bytes) => match vector_from_bytes(&bytes) {
                Some(v) if v.len() == self.schema.dim => LastVector::Dim(v.len()),
                _ => LastVector::Malformed,
            },
        })
    }

    async fn list_indices(&self) -> Result<Vec<IndexInfo>, BackendError> {
        let indices = crud::list_indices(&self.db, &self.name).await?;
        let mut indices = indices
            .into_iter()
            .map(|(record, columns)| IndexInfo { name: record.name, columns, unique: record.unique })
            .collect::<Vec<_>>();
        indices.push(IndexInfo {
            name: format!("{}_vector_usearch", self.name),
            columns: vec!["vector".to_string()],
            unique: false,
        });
        Ok(indices)
    }

    async fn flush(&self) -> Result<(), BackendError> {
        let mut state = self.ann.state.lock().await;
        self.sync(&mut state).await?;
        if state.synced == state.saved {
            return Ok(());
        }
        let ann = self.ann.clone();
        spawn_blocking(move || ann.save()).await.map_err(BackendError::permanent)??;
        crud::set_ann_rowid(&self.db, &self.name, state.synced).await?;
        state.saved = state.synced;
        info!("近似索引已保存: {}", self.ann.path().display());
        Ok(())
    }
}
