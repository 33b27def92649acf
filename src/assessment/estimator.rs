//! 水平估计器：所有轮次观测等级的加权平均 + 饱和置信度
//!
//! value_n = Σ(level_i·w_i) / Σw_i（截断到 [1,5]），confidence = 1 − exp(−Σw/k)。

use crate::assessment::evidence::TurnEvidence;
use crate::assessment::types::{EvidenceTotals, LevelEstimate};

#[derive(Debug, Clone, Copy)]
pub struct LevelEstimator {
    /// 饱和尺度 k；越小置信度上升越快
    confidence_scale: f64,
}

impl LevelEstimator {
    pub fn new(confidence_scale: f64) -> Self {
        Self { confidence_scale }
    }

    /// 纳入一轮证据；负权重按 0 处理，保证置信度单调不减
    pub fn update(
        &self,
        prior: &LevelEstimate,
        totals: &EvidenceTotals,
        evidence: &TurnEvidence,
    ) -> (LevelEstimate, EvidenceTotals) {
        let weight = if evidence.weight.is_finite() {
            evidence.weight.max(0.0)
        } else {
            0.0
        };

        let totals = EvidenceTotals {
            weighted_sum: totals.weighted_sum + evidence.observed_level() * weight,
            total_weight: totals.total_weight + weight,
        };

        let value = if totals.total_weight > 0.0 {
            (totals.weighted_sum / totals.total_weight).clamp(1.0, 5.0)
        } else {
            prior.value
        };

        let estimate = LevelEstimate {
            value,
            confidence: self.confidence_for(totals.total_weight).max(prior.confidence),
            turn: prior.turn + 1,
        };
        (estimate, totals)
    }

    pub fn confidence_for(&self, total_weight: f64) -> f64 {
        if total_weight <= 0.0 {
            return 0.0;
        }
        (1.0 - (-total_weight / self.confidence_scale).exp()).clamp(0.0, 1.0)
    }
}

impl Default for LevelEstimator {
    fn default() -> Self {
        Self::new(0.8)
    }
}
