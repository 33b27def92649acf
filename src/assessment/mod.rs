//! 评估决策引擎：难度选择、证据聚合、水平估计、早停、最终打分
//!
//! 这些组件都是纯计算，不挂起；外部调用（出题、判分、复核）只发生在 core::orchestrator。

pub mod combiner;
pub mod estimator;
pub mod evidence;
pub mod selector;
pub mod stopping;
pub mod types;

pub use combiner::FinalScoringCombiner;
pub use estimator::LevelEstimator;
pub use evidence::{EvidenceAggregator, TurnEvidence};
pub use selector::{DifficultySelector, SearchInterval};
pub use stopping::{EarlyStopping, StopDecision};
pub use types::{
    AssessmentStats, Correctness, EvidenceTotals, HolisticReview, Judgment, LevelEstimate,
    QaPair, SessionState, SkillLevel, StopReason, Topic, TurnSnapshot,
};
