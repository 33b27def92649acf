//! 会话阶段与快照投影
//!
//! 外部观察者只持有轻量的 SessionSnapshot（阶段、轮次、估计、区间）；完整 SessionState 由 Orchestrator 独占并投影到快照。

use serde::Serialize;

use crate::assessment::{LevelEstimate, SearchInterval, SessionState, SkillLevel, StopReason};

/// 会话阶段：INIT → QUESTIONING（自环）→ TERMINATED
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Init,
    Questioning,
    Terminated,
}

/// 会话快照（用于 watch 通道与日志）
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub student_id: String,
    pub topic_id: String,
    pub phase: SessionPhase,
    pub turn: usize,
    pub estimate: LevelEstimate,
    pub interval: SearchInterval,
    pub last_difficulty: Option<SkillLevel>,
    pub stop_reason: Option<StopReason>,
}

impl SessionSnapshot {
    /// 将内部状态投影为快照；阶段由调用方给出
    pub fn project(state: &SessionState, phase: SessionPhase) -> Self {
        Self {
            student_id: state.student_id.clone(),
            topic_id: state.topic.id.clone(),
            phase,
            turn: state.turn,
            estimate: state.estimate,
            interval: state.interval,
            last_difficulty: state.transcript.last().map(|qa| qa.difficulty),
            stop_reason: state.stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::Topic;

    #[test]
    fn test_project_fresh_session() {
        let state = SessionState::new("s1", Topic::bare("t1"));
        let snapshot = SessionSnapshot::project(&state, SessionPhase::Init);
        assert_eq!(snapshot.turn, 0);
        assert_eq!(snapshot.phase, SessionPhase::Init);
        assert!(snapshot.last_difficulty.is_none());
        assert_eq!(snapshot.interval, SearchInterval::full());
    }
}
