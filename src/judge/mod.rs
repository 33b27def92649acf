//! 判定层：判定提供方接口与实现（LLM / 规则模拟）

pub mod llm_judge;
pub mod provider;
pub mod simulated;

pub use llm_judge::LlmJudge;
pub use provider::{JudgmentProvider, QuestionRequest};
pub use simulated::{difficulty_tag, SimulatedJudge};
