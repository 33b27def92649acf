//! 评估错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：协作方失败 / 判定畸形可在有限次数内重试，其余直接终止当前会话。

use std::time::Duration;

use thiserror::Error;

/// 评估过程中可能出现的错误
#[derive(Error, Debug, Clone)]
pub enum AssessError {
    /// 出题 / 判分 / 复核 / 数据源 / 学生通道失败或超时
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// 判定缺字段或取值越界
    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    #[error("Submission failed for {student_id}/{topic_id}: {message}")]
    Submission {
        student_id: String,
        topic_id: String,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session cancelled")]
    Cancelled,
}

impl AssessError {
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// 只有协作方错误与畸形判定值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssessError::Collaborator { .. } | AssessError::MalformedJudgment(_)
        )
    }
}

/// 恢复引擎根据错误类型与已尝试次数给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 再试一次（第 attempt 次重试）
    Retry { attempt: u32 },
    /// 放弃，错误上抛到会话边界
    Abort,
}
