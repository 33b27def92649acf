//! 规则模拟的判定提供方（离线运行与测试）
//!
//! 题目文本带 `[difficulty N]` 标签，模拟学生据此作答；判分只看回答前缀 correct / partial / incorrect。
//! 复核回放搜索区间：只答对过取上界，答错过取下界，都没有（全是部分正确）取中点。

use std::collections::HashSet;

use async_trait::async_trait;

use crate::assessment::{
    Correctness, HolisticReview, Judgment, QaPair, SearchInterval, SkillLevel, Topic,
};
use crate::core::AssessError;
use crate::judge::{JudgmentProvider, QuestionRequest};

const TAG_PREFIX: &str = "[difficulty ";

/// 从题目中读出难度标签
pub fn difficulty_tag(question: &str) -> Option<SkillLevel> {
    let start = question.find(TAG_PREFIX)? + TAG_PREFIX.len();
    let rest = &question[start..];
    let end = rest.find(']')?;
    rest[..end].trim().parse::<u8>().ok().and_then(SkillLevel::new)
}

#[derive(Debug, Clone)]
pub struct SimulatedJudge {
    confidence: f64,
    review_confidence: f64,
    failing_topics: HashSet<String>,
}

impl SimulatedJudge {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            review_confidence: 0.8,
            failing_topics: HashSet::new(),
        }
    }

    /// 该主题的所有调用都返回协作方错误
    pub fn failing_on(mut self, topic_id: impl Into<String>) -> Self {
        self.failing_topics.insert(topic_id.into());
        self
    }

    fn check(&self, topic: &Topic) -> Result<(), AssessError> {
        if self.failing_topics.contains(&topic.id) {
            return Err(AssessError::collaborator(
                "simulated judge",
                format!("provider timeout on topic {}", topic.id),
            ));
        }
        Ok(())
    }
}

impl Default for SimulatedJudge {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl JudgmentProvider for SimulatedJudge {
    async fn ask_question(&self, request: QuestionRequest<'_>) -> Result<String, AssessError> {
        self.check(request.topic)?;
        Ok(format!(
            "{}{}] {} question #{} on {}",
            TAG_PREFIX,
            request.difficulty,
            request.difficulty.label(),
            request.history.len() + 1,
            request.topic.name
        ))
    }

    async fn judge_response(
        &self,
        topic: &Topic,
        _question: &str,
        _difficulty: SkillLevel,
        response: &str,
    ) -> Result<Judgment, AssessError> {
        self.check(topic)?;
        let answer = response.trim().to_lowercase();
        if answer.starts_with("correct") {
            Judgment::correct(self.confidence)
        } else if answer.starts_with("partial") {
            Judgment::partial(0.5, self.confidence)
        } else {
            Judgment::incorrect(self.confidence)
        }
    }

    async fn review_transcript(
        &self,
        topic: &Topic,
        transcript: &[QaPair],
    ) -> Result<HolisticReview, AssessError> {
        self.check(topic)?;
        let interval = SearchInterval::replay(transcript);
        let answered = |c: Correctness| transcript.iter().any(|qa| qa.judgment.correctness == c);
        let level = match (answered(Correctness::Correct), answered(Correctness::Incorrect)) {
            (true, false) => interval.hi,
            (false, false) => interval.midpoint(),
            _ => interval.lo,
        };
        HolisticReview::new(level, self.review_confidence)
    }
}
