//! 错误恢复引擎
//!
//! 根据 AssessError 与已重试次数返回 RecoveryAction；call() 包装一次外部调用，
//! 最多重试 retry_limit 次，避免掩盖系统性故障。

use std::future::Future;
use std::time::Duration;

use crate::core::{AssessError, RecoveryAction};

/// 有界重试：可重试错误在次数内重试，其他错误立即终止
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    retry_limit: u32,
    backoff: Duration,
}

impl RecoveryEngine {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            backoff: Duration::from_millis(200),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// retries_so_far：已经做过的重试次数
    pub fn handle(&self, err: &AssessError, retries_so_far: u32) -> RecoveryAction {
        if err.is_retryable() && retries_so_far < self.retry_limit {
            RecoveryAction::Retry {
                attempt: retries_so_far + 1,
            }
        } else {
            RecoveryAction::Abort
        }
    }

    /// 执行 op，失败时按 handle 的建议重试或返回最后一次错误
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AssessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AssessError>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.handle(&err, retries) {
                    RecoveryAction::Retry { attempt } => {
                        tracing::warn!(
                            "{} failed ({}), retry {}/{}",
                            label,
                            err,
                            attempt,
                            self.retry_limit
                        );
                        retries = attempt;
                        if !self.backoff.is_zero() {
                            tokio::time::sleep(self.backoff * attempt).await;
                        }
                    }
                    RecoveryAction::Abort => return Err(err),
                },
            }
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2)
    }
}
