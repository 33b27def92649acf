//! 判定提供方接口
//!
//! 引擎只依赖三个操作的输入输出契约：出题、单轮判分、整段复核。
//! 判定如何产生（LLM 推理、规则模拟）完全在实现方内部。

use async_trait::async_trait;

use crate::assessment::{HolisticReview, Judgment, QaPair, SkillLevel, Topic};
use crate::core::AssessError;

/// 出题请求：主题、目标难度、此前各轮、原样透传的学生画像
#[derive(Debug, Clone, Copy)]
pub struct QuestionRequest<'a> {
    pub topic: &'a Topic,
    pub difficulty: SkillLevel,
    pub history: &'a [QaPair],
    pub profile: &'a serde_json::Value,
}

#[async_trait]
pub trait JudgmentProvider: Send + Sync {
    /// 按目标难度生成下一道题
    async fn ask_question(&self, request: QuestionRequest<'_>) -> Result<String, AssessError>;

    /// 判定一次作答
    async fn judge_response(
        &self,
        topic: &Topic,
        question: &str,
        difficulty: SkillLevel,
        response: &str,
    ) -> Result<Judgment, AssessError>;

    /// review 模式：对完整问答记录给出整体等级
    async fn review_transcript(
        &self,
        topic: &Topic,
        transcript: &[QaPair],
    ) -> Result<HolisticReview, AssessError>;

    /// 累计 token 使用：(prompt, completion, total)；不调用 LLM 的实现返回 0
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
