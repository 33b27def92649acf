//! 最终打分：运行估计与整体复核的加权平均
//!
//! final = round((value·confidence + holistic·holistic_weight) / (confidence + holistic_weight))，截断到 [1,5]。
//! holistic_weight 是配置常量，同样输入总得到同样结果。

use crate::assessment::types::{HolisticReview, LevelEstimate, QaPair, SkillLevel, Topic};
use crate::core::{AssessError, RecoveryEngine};
use crate::judge::JudgmentProvider;

#[derive(Debug, Clone, Copy)]
pub struct FinalScoringCombiner {
    holistic_weight: f64,
}

impl FinalScoringCombiner {
    pub fn new(holistic_weight: f64) -> Self {
        Self { holistic_weight }
    }

    /// 请求 review 模式复核并合成最终分数；复核失败即会话失败，不做兜底
    pub async fn combine(
        &self,
        judge: &dyn JudgmentProvider,
        recovery: &RecoveryEngine,
        topic: &Topic,
        running: &LevelEstimate,
        transcript: &[QaPair],
    ) -> Result<(SkillLevel, HolisticReview), AssessError> {
        let review = recovery
            .call("review_transcript", move || judge.review_transcript(topic, transcript))
            .await?;
        let score = self.blend(running, &review);
        tracing::debug!(
            "combined running {:.2} (conf {:.2}) with holistic {} -> {}",
            running.value,
            running.confidence,
            review.level,
            score
        );
        Ok((score, review))
    }

    pub fn blend(&self, running: &LevelEstimate, review: &HolisticReview) -> SkillLevel {
        let running_weight = running.confidence.max(0.0);
        let holistic_weight = self.holistic_weight.max(0.0);
        let total = running_weight + holistic_weight;
        if total <= 0.0 {
            return SkillLevel::from_estimate(running.value);
        }
        let blended =
            (running.value * running_weight + review.level.as_f64() * holistic_weight) / total;
        SkillLevel::from_estimate(blended)
    }
}

impl Default for FinalScoringCombiner {
    fn default() -> Self {
        Self::new(0.5)
    }
}
