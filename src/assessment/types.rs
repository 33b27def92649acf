//! 评估数据模型：技能等级、判定、问答对、水平估计、停止原因、会话状态

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::selector::SearchInterval;
use crate::core::AssessError;

/// 技能等级：1（Struggling）到 5（Advanced）的有序整数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SkillLevel(u8);

impl SkillLevel {
    pub const STRUGGLING: SkillLevel = SkillLevel(1);
    pub const BELOW_GRADE: SkillLevel = SkillLevel(2);
    pub const AT_GRADE: SkillLevel = SkillLevel(3);
    pub const ABOVE_GRADE: SkillLevel = SkillLevel(4);
    pub const ADVANCED: SkillLevel = SkillLevel(5);

    pub const MIN: SkillLevel = Self::STRUGGLING;
    pub const MAX: SkillLevel = Self::ADVANCED;

    /// 等级区间的参考中点（中性先验）
    pub const MIDPOINT: f64 = 3.0;

    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }

    /// 实数估计四舍五入并截断到 [1,5]；非有限值回落到中点
    pub fn from_estimate(value: f64) -> Self {
        if !value.is_finite() {
            return Self::AT_GRADE;
        }
        let rounded = value.round().clamp(1.0, 5.0);
        Self(rounded as u8)
    }

    /// 按步长偏移，结果限制在 [1,5]
    pub fn offset(self, step: i8) -> Self {
        let shifted = (self.0 as i8 + step).clamp(1, 5);
        Self(shifted as u8)
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Struggling",
            2 => "Below-grade",
            3 => "At-grade",
            4 => "Above-grade",
            _ => "Advanced",
        }
    }
}

impl TryFrom<u8> for SkillLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("skill level {value} outside 1..=5"))
    }
}

impl From<SkillLevel> for u8 {
    fn from(level: SkillLevel) -> Self {
        level.0
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 主题元数据（题目生成与整体复核需要）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject_name: String,
    #[serde(default)]
    pub grade_level: u32,
}

impl Topic {
    /// 仅有 id 的主题（测试与离线数据集）
    pub fn bare(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            subject_name: String::new(),
            grade_level: 0,
        }
    }
}

/// 单轮回答的正确性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Correct,
    Partial,
    Incorrect,
}

impl Correctness {
    /// 未给出部分得分时的默认 credit
    pub fn default_credit(self) -> f64 {
        match self {
            Correctness::Correct => 1.0,
            Correctness::Partial => 0.5,
            Correctness::Incorrect => 0.0,
        }
    }
}

/// 外部判定结果：正确性、部分得分与判定置信度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub correctness: Correctness,
    /// 部分得分，[0,1]
    pub credit: f64,
    /// 判定置信度，[0,1]
    pub confidence: f64,
}

impl Judgment {
    pub fn new(correctness: Correctness, confidence: f64) -> Result<Self, AssessError> {
        Self {
            correctness,
            credit: correctness.default_credit(),
            confidence,
        }
        .validated()
    }

    pub fn correct(confidence: f64) -> Result<Self, AssessError> {
        Self::new(Correctness::Correct, confidence)
    }

    pub fn incorrect(confidence: f64) -> Result<Self, AssessError> {
        Self::new(Correctness::Incorrect, confidence)
    }

    pub fn partial(credit: f64, confidence: f64) -> Result<Self, AssessError> {
        Self {
            correctness: Correctness::Partial,
            credit,
            confidence,
        }
        .validated()
    }

    /// 范围校验：越界视为畸形判定，而不是让估计器崩溃
    pub fn validated(self) -> Result<Self, AssessError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AssessError::MalformedJudgment(format!(
                "confidence {} outside [0,1]",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.credit) {
            return Err(AssessError::MalformedJudgment(format!(
                "credit {} outside [0,1]",
                self.credit
            )));
        }
        Ok(self)
    }
}

/// 一轮问答记录，写入后不可变，按轮次顺序追加
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub turn: usize,
    pub question: String,
    pub difficulty: SkillLevel,
    pub response: String,
    pub judgment: Judgment,
}

/// 运行中的水平估计，带上产生它的轮次
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelEstimate {
    /// [1,5]
    pub value: f64,
    /// [0,1]
    pub confidence: f64,
    pub turn: usize,
}

impl LevelEstimate {
    /// 中性先验：中点、零置信度、第 0 轮
    pub fn prior() -> Self {
        Self {
            value: SkillLevel::MIDPOINT,
            confidence: 0.0,
            turn: 0,
        }
    }

    pub fn level(&self) -> SkillLevel {
        SkillLevel::from_estimate(self.value)
    }
}

impl Default for LevelEstimate {
    fn default() -> Self {
        Self::prior()
    }
}

/// 整体复核（review 模式）给出的第二估计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HolisticReview {
    pub level: SkillLevel,
    pub confidence: f64,
}

impl HolisticReview {
    pub fn new(level: SkillLevel, confidence: f64) -> Result<Self, AssessError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AssessError::MalformedJudgment(format!(
                "review confidence {confidence} outside [0,1]"
            )));
        }
        Ok(Self { level, confidence })
    }
}

/// 会话终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 达到轮次上限
    MaxTurns,
    /// 置信度达标且满足最少轮次
    Confident,
    /// 搜索区间收敛且估计稳定
    Converged,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxTurns => "max_turns",
            StopReason::Confident => "confident",
            StopReason::Converged => "converged",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 每轮结束后的快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnSnapshot {
    pub estimate: LevelEstimate,
    pub interval: SearchInterval,
    pub difficulty: SkillLevel,
}

/// 单会话聚合统计；会话终止后只读
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssessmentStats {
    pub turns: usize,
    pub snapshots: Vec<TurnSnapshot>,
    pub final_score: Option<SkillLevel>,
}

/// 估计器的累计量：Σ(level·w) 与 Σw
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EvidenceTotals {
    pub weighted_sum: f64,
    pub total_weight: f64,
}

/// 会话状态：由单个 SessionOrchestrator 独占
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: Uuid,
    pub student_id: String,
    pub topic: Topic,
    pub transcript: Vec<QaPair>,
    pub estimate: LevelEstimate,
    pub totals: EvidenceTotals,
    pub interval: SearchInterval,
    pub turn: usize,
    pub terminated: bool,
    pub stop_reason: Option<StopReason>,
    pub stats: AssessmentStats,
}

impl SessionState {
    pub fn new(student_id: impl Into<String>, topic: Topic) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            student_id: student_id.into(),
            topic,
            transcript: Vec::new(),
            estimate: LevelEstimate::prior(),
            totals: EvidenceTotals::default(),
            interval: SearchInterval::full(),
            turn: 0,
            terminated: false,
            stop_reason: None,
            stats: AssessmentStats::default(),
        }
    }

    /// 记录一轮：追加问答、更新估计与区间、轮次加一
    pub fn record_turn(
        &mut self,
        qa: QaPair,
        estimate: LevelEstimate,
        totals: EvidenceTotals,
        interval: SearchInterval,
    ) {
        let difficulty = qa.difficulty;
        self.transcript.push(qa);
        self.turn += 1;
        self.estimate = estimate;
        self.totals = totals;
        self.interval = interval;
        self.stats.turns = self.turn;
        self.stats.snapshots.push(TurnSnapshot {
            estimate,
            interval,
            difficulty,
        });
    }

    pub fn terminate(&mut self, reason: StopReason) {
        self.terminated = true;
        self.stop_reason = Some(reason);
    }
}
