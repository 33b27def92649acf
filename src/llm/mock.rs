//! Mock LLM 客户端（用于测试与无 API Key 的离线运行）
//!
//! 按顺序返回预置回复；队列耗尽后返回一条中性 JSON，出题 / 判分 / 复核三种模式都能解析。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 队列耗尽后的默认回复
pub const NEUTRAL_REPLY: &str = r#"{"question": "Explain the main idea of this topic in your own words.", "correctness": "partial", "credit": 0.5, "confidence": 0.5, "level": 3}"#;

/// Mock 客户端：脚本化回复，并记录收到的最后一条 User 消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// 下一次调用返回错误
    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(error.into()));
        }
    }

    /// 收到过的 User 消息内容（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::llm::Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "(no input)".to_string());
        if let Ok(mut p) = self.prompts.lock() {
            p.push(last_user);
        }

        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Ok(NEUTRAL_REPLY.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_then_neutral() {
        let mock = MockLlmClient::with_replies(["first"]);
        mock.push_error("boom");
        let msgs = vec![Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap_err(), "boom");
        assert_eq!(mock.complete(&msgs).await.unwrap(), NEUTRAL_REPLY);
        assert_eq!(mock.prompts(), vec!["hello", "hello", "hello"]);
    }
}
