//! 会话监管：批次级取消
//!
//! 持有根 CancellationToken，Ctrl+C 时取消整个批次；每个会话拿一个子 token，单独超时或失败不影响其他会话。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取消所有会话
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个会话）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}
