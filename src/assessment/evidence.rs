//! 单轮证据聚合：把一次判定解释为带符号的 delta 与权重
//!
//! delta = credit·correct_step − (1−credit)·incorrect_step，观测等级 = 难度 + delta（截断到 [1,5]）。
//! 权重取判定置信度，部分正确再乘 partial_weight。

use serde::Serialize;

use crate::assessment::types::{Correctness, QaPair, SkillLevel};
use crate::config::AssessmentSection;

/// 一轮的证据贡献
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnEvidence {
    pub difficulty: SkillLevel,
    /// 答对为正，答错为负
    pub delta: f64,
    /// 非负
    pub weight: f64,
}

impl TurnEvidence {
    /// 该轮指向的等级
    pub fn observed_level(&self) -> f64 {
        (self.difficulty.as_f64() + self.delta).clamp(1.0, 5.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EvidenceAggregator {
    correct_step: f64,
    incorrect_step: f64,
    partial_weight: f64,
}

impl EvidenceAggregator {
    pub fn new(correct_step: f64, incorrect_step: f64, partial_weight: f64) -> Self {
        Self {
            correct_step,
            incorrect_step,
            partial_weight,
        }
    }

    pub fn from_config(config: &AssessmentSection) -> Self {
        Self::new(
            config.correct_step,
            config.incorrect_step,
            config.partial_weight,
        )
    }

    pub fn aggregate(&self, qa: &QaPair) -> TurnEvidence {
        let judgment = &qa.judgment;
        let credit = judgment.credit.clamp(0.0, 1.0);
        let delta = credit * self.correct_step - (1.0 - credit) * self.incorrect_step;

        let quality = match judgment.correctness {
            Correctness::Partial => self.partial_weight,
            Correctness::Correct | Correctness::Incorrect => 1.0,
        };
        let weight = (judgment.confidence * quality).max(0.0);

        TurnEvidence {
            difficulty: qa.difficulty,
            delta,
            weight,
        }
    }
}

impl Default for EvidenceAggregator {
    fn default() -> Self {
        Self::from_config(&AssessmentSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::types::Judgment;

    fn qa(difficulty: u8, judgment: Judgment) -> QaPair {
        QaPair {
            turn: 1,
            question: "q".into(),
            difficulty: SkillLevel::new(difficulty).unwrap(),
            response: "a".into(),
            judgment,
        }
    }

    #[test]
    fn test_correct_is_positive_and_incorrect_negative() {
        let agg = EvidenceAggregator::default();
        let up = agg.aggregate(&qa(3, Judgment::correct(0.9).unwrap()));
        let down = agg.aggregate(&qa(3, Judgment::incorrect(0.9).unwrap()));
        assert!(up.delta > 0.0);
        assert!(down.delta < 0.0);
        assert_eq!(up.observed_level(), 4.0);
        assert_eq!(down.observed_level(), 2.0);
    }

    #[test]
    fn test_partial_credit_reduces_weight() {
        let agg = EvidenceAggregator::default();
        let full = agg.aggregate(&qa(3, Judgment::correct(0.8).unwrap()));
        let partial = agg.aggregate(&qa(3, Judgment::partial(0.5, 0.8).unwrap()));
        assert!(partial.weight < full.weight);
        assert_eq!(partial.observed_level(), 3.0);
    }

    #[test]
    fn test_observed_level_clamped() {
        let agg = EvidenceAggregator::default();
        let top = agg.aggregate(&qa(5, Judgment::correct(1.0).unwrap()));
        let bottom = agg.aggregate(&qa(1, Judgment::incorrect(1.0).unwrap()));
        assert_eq!(top.observed_level(), 5.0);
        assert_eq!(bottom.observed_level(), 1.0);
    }

    #[test]
    fn test_zero_confidence_has_no_weight() {
        let agg = EvidenceAggregator::default();
        let ev = agg.aggregate(&qa(2, Judgment::correct(0.0).unwrap()));
        assert_eq!(ev.weight, 0.0);
    }
}
