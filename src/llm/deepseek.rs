//! DeepSeek 预设（OpenAI 兼容端点）

use std::time::Duration;

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 判分用的模型名：配置里是 deepseek-* 就用配置，否则看 DEEPSEEK_MODEL，最后回落到 deepseek-chat
pub fn deepseek_model(cfg: &LlmSection, env_model: Option<String>) -> String {
    if cfg.model.starts_with("deepseek") {
        return cfg.model.clone();
    }
    env_model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string())
}

/// 按 [llm] 段创建 DeepSeek 客户端；Key 取 DEEPSEEK_API_KEY，没有时借用 OPENAI_API_KEY
pub fn create_deepseek_client(cfg: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let model = deepseek_model(cfg, std::env::var("DEEPSEEK_MODEL").ok());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, api_key.as_deref())
        .with_request_timeout(Duration::from_secs(cfg.request_timeout_secs))
        .with_temperature(cfg.temperature)
}
