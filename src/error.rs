use std::time::Duration;

/// 外部服务调用失败的分类，用于决定是否重试
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// 网络抖动、服务端 5xx 等可以重试的错误
    #[error("{0:#}")]
    Transient(anyhow::Error),
    /// 权限、配额、格式错误等重试也无济于事的错误
    #[error("{0:#}")]
    Permanent(anyhow::Error),
    /// 单次调用超时
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        // 去掉 URL，避免泄露端点地址
        let retryable = err.is_timeout()
            || err.is_connect()
            || err.status().is_some_and(|s| s.is_server_error());
        let err = err.without_url();
        if retryable { Self::Transient(err.into()) } else { Self::Permanent(err.into()) }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
                Self::Transient(err.into())
            }
            sqlx::Error::Database(ref db)
                if db.message().contains("locked") || db.message().contains("busy") =>
            {
                Self::Transient(err.into())
            }
            _ => Self::Permanent(err.into()),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            Interrupted | TimedOut | WouldBlock => Self::Transient(err.into()),
            _ => Self::Permanent(err.into()),
        }
    }
}

/// 入库、检索、统计三条流水线对外暴露的错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage failure: {0}")]
    Storage(#[source] BackendError),
    #[error("embedding failure: {0}")]
    Embedding(#[source] BackendError),
    #[error("index failure: {0}")]
    Index(#[source] BackendError),
    #[error("table `{0}` not found")]
    NotFound(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// 出错的阶段名称，用于日志、指标和响应体
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid",
            Self::Storage(_) => "storage",
            Self::Embedding(_) => "embedding",
            Self::Index(_) => "index",
            Self::NotFound(_) => "not_found",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
