//! 早停策略
//!
//! 按优先级检查：(a) 轮次上限（无条件终止）；(b) 置信度达标且已满最少轮次；
//! (c) 搜索区间连续 N 轮收敛且估计值稳定（同样要求满最少轮次）。

use crate::assessment::types::{SessionState, StopReason};
use crate::config::AssessmentSection;

/// 早停检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct StopDecision {
    pub stop: bool,
    pub reason: Option<StopReason>,
    pub message: Option<String>,
}

impl StopDecision {
    fn proceed() -> Self {
        Self {
            stop: false,
            reason: None,
            message: None,
        }
    }

    fn stop(reason: StopReason, message: String) -> Self {
        Self {
            stop: true,
            reason: Some(reason),
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    max_turns: usize,
    min_turns: usize,
    confidence_threshold: f64,
    converged_turns: usize,
    stability_epsilon: f64,
}

impl EarlyStopping {
    pub fn from_config(config: &AssessmentSection) -> Self {
        Self {
            max_turns: config.max_turns,
            min_turns: config.min_turns,
            confidence_threshold: config.confidence_threshold,
            converged_turns: config.converged_turns.max(1),
            stability_epsilon: config.stability_epsilon,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn should_stop(&self, state: &SessionState) -> StopDecision {
        let turn = state.turn;

        if turn >= self.max_turns {
            return StopDecision::stop(
                StopReason::MaxTurns,
                format!("Reached turn ceiling ({}/{})", turn, self.max_turns),
            );
        }

        if turn < self.min_turns {
            return StopDecision::proceed();
        }

        let confidence = state.estimate.confidence;
        if confidence >= self.confidence_threshold {
            return StopDecision::stop(
                StopReason::Confident,
                format!(
                    "Confidence {:.0}% >= {:.0}% at turn {}",
                    confidence * 100.0,
                    self.confidence_threshold * 100.0,
                    turn
                ),
            );
        }

        if let Some(level) = self.converged_level(state) {
            return StopDecision::stop(
                StopReason::Converged,
                format!(
                    "Search converged on level {} for {} turns at turn {}",
                    level, self.converged_turns, turn
                ),
            );
        }

        StopDecision::proceed()
    }

    /// 最近 N 个快照都收敛到同一等级且估计值波动不超过 epsilon 时返回该等级
    fn converged_level(&self, state: &SessionState) -> Option<u8> {
        let snapshots = &state.stats.snapshots;
        if snapshots.len() < self.converged_turns {
            return None;
        }
        let window = &snapshots[snapshots.len() - self.converged_turns..];
        let level = window.first()?.interval.lo;

        let all_converged = window
            .iter()
            .all(|s| s.interval.is_converged() && s.interval.lo == level);
        if !all_converged {
            return None;
        }

        let (min, max) = window.iter().fold((f64::MAX, f64::MIN), |(lo, hi), s| {
            (lo.min(s.estimate.value), hi.max(s.estimate.value))
        });
        (max - min <= self.stability_epsilon).then_some(level.get())
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::from_config(&AssessmentSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::selector::SearchInterval;
    use crate::assessment::types::{
        EvidenceTotals, Judgment, LevelEstimate, QaPair, SkillLevel, Topic,
    };

    fn config(max_turns: usize, min_turns: usize, threshold: f64) -> AssessmentSection {
        AssessmentSection {
            max_turns,
            min_turns,
            confidence_threshold: threshold,
            ..AssessmentSection::default()
        }
    }

    fn push_turn(state: &mut SessionState, value: f64, confidence: f64, interval: SearchInterval) {
        let turn = state.turn + 1;
        let qa = QaPair {
            turn,
            question: "q".into(),
            difficulty: interval.lo,
            response: "a".into(),
            judgment: Judgment::correct(1.0).unwrap(),
        };
        let estimate = LevelEstimate { value, confidence, turn };
        state.record_turn(qa, estimate, EvidenceTotals::default(), interval);
    }

    fn pinned(level: u8) -> SearchInterval {
        let l = SkillLevel::new(level).unwrap();
        SearchInterval { lo: l, hi: l }
    }

    #[test]
    fn test_max_turns_always_wins() {
        let policy = EarlyStopping::from_config(&config(2, 2, 0.9));
        let mut state = SessionState::new("s", Topic::bare("t"));
        push_turn(&mut state, 3.0, 0.1, SearchInterval::full());
        assert!(!policy.should_stop(&state).stop);
        push_turn(&mut state, 3.0, 0.95, SearchInterval::full());
        let decision = policy.should_stop(&state);
        assert!(decision.stop);
        assert_eq!(decision.reason, Some(StopReason::MaxTurns));
    }

    #[test]
    fn test_confident_respects_min_turns() {
        let policy = EarlyStopping::from_config(&config(3, 2, 0.9));
        let mut state = SessionState::new("s", Topic::bare("t"));
        push_turn(&mut state, 4.0, 0.95, SearchInterval::full());
        assert!(!policy.should_stop(&state).stop);
        push_turn(&mut state, 4.0, 0.95, SearchInterval::full());
        let decision = policy.should_stop(&state);
        assert_eq!(decision.reason, Some(StopReason::Confident));
    }

    #[test]
    fn test_converged_needs_consecutive_stable_turns() {
        let policy = EarlyStopping::from_config(&AssessmentSection {
            max_turns: 8,
            min_turns: 2,
            confidence_threshold: 0.99,
            converged_turns: 2,
            stability_epsilon: 0.5,
            ..AssessmentSection::default()
        });
        let mut state = SessionState::new("s", Topic::bare("t"));
        push_turn(&mut state, 3.0, 0.3, SearchInterval::full());
        push_turn(&mut state, 2.0, 0.5, pinned(2));
        assert!(!policy.should_stop(&state).stop);
        push_turn(&mut state, 1.8, 0.6, pinned(2));
        assert_eq!(policy.should_stop(&state).reason, Some(StopReason::Converged));
    }

    #[test]
    fn test_unstable_value_does_not_converge() {
        let policy = EarlyStopping::from_config(&AssessmentSection {
            max_turns: 8,
            min_turns: 1,
            confidence_threshold: 0.99,
            converged_turns: 2,
            stability_epsilon: 0.25,
            ..AssessmentSection::default()
        });
        let mut state = SessionState::new("s", Topic::bare("t"));
        push_turn(&mut state, 4.0, 0.3, pinned(5));
        push_turn(&mut state, 4.6, 0.4, pinned(5));
        assert!(!policy.should_stop(&state).stop);
    }
}
