use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::error::BackendError;

/// 外部调用的超时与重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub attempts: u32,
    /// 单次调用超时
    pub timeout: Duration,
    /// 首次重试前的等待时间，之后每次翻倍
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, timeout: Duration::from_secs(30), backoff: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    /// 执行一次外部调用，超时或临时错误时按退避重试，永久错误立即返回
    pub async fn run<T, F, Fut>(&self, stage: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.timeout)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!("{stage}: 第 {attempt}/{attempts} 次调用失败，稍后重试: {err}");
                    tokio::time::sleep(delay + jitter(delay)).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let max = delay.as_millis() as u64 / 4;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max))
}
