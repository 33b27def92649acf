//! 批次报告：成绩 / 失败两张映射、JSON 持久化、摘要、预测提交
//!
//! 每个请求过的 (student, topic) 恰好出现在 results 或 errors 其中之一。
//! 学生整体枚举失败（主题列不出来）记为 topic_id = None 的 SessionFailure。

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::assessment::{SkillLevel, StopReason};
use crate::config::Dataset;
use crate::core::{AssessError, SessionOutcome};
use crate::platform::{Prediction, PredictionSink};

/// 单个 (student, topic) 的最终成绩
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub student_id: String,
    pub topic_id: String,
    pub score: SkillLevel,
    pub turns: usize,
    pub stop_reason: StopReason,
    pub duration_ms: u64,
}

impl From<&SessionOutcome> for ScoreRecord {
    fn from(outcome: &SessionOutcome) -> Self {
        Self {
            student_id: outcome.student_id.clone(),
            topic_id: outcome.topic_id.clone(),
            score: outcome.score,
            turns: outcome.turns,
            stop_reason: outcome.stop_reason,
            duration_ms: outcome.duration_ms,
        }
    }
}

/// 会话失败或学生枚举失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub student_id: String,
    pub topic_id: Option<String>,
    pub message: String,
}

impl SessionFailure {
    pub fn session(student_id: &str, topic_id: &str, err: &AssessError) -> Self {
        Self {
            student_id: student_id.to_string(),
            topic_id: Some(topic_id.to_string()),
            message: err.to_string(),
        }
    }

    pub fn enumeration(student_id: &str, err: &AssessError) -> Self {
        Self {
            student_id: student_id.to_string(),
            topic_id: None,
            message: err.to_string(),
        }
    }
}

/// 整批累计的 LLM token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmTokens {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl From<(u64, u64, u64)> for LlmTokens {
    fn from((prompt, completion, total): (u64, u64, u64)) -> Self {
        Self {
            prompt,
            completion,
            total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub dataset: String,
    pub timestamp: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub llm_tokens: LlmTokens,
    pub results: BTreeMap<String, Vec<ScoreRecord>>,
    pub errors: BTreeMap<String, Vec<SessionFailure>>,
}

impl BatchReport {
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            dataset: dataset.to_string(),
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            duration_ms: 0,
            llm_tokens: LlmTokens::default(),
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn record_success(&mut self, record: ScoreRecord) {
        self.results
            .entry(record.student_id.clone())
            .or_default()
            .push(record);
    }

    pub fn record_failure(&mut self, failure: SessionFailure) {
        self.errors
            .entry(failure.student_id.clone())
            .or_default()
            .push(failure);
    }

    pub fn completed(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn failed(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// 所有成绩，按学生 id 顺序
    pub fn scores(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.results.values().flatten()
    }

    pub fn score_for(&self, student_id: &str, topic_id: &str) -> Option<SkillLevel> {
        self.results
            .get(student_id)?
            .iter()
            .find(|r| r.topic_id == topic_id)
            .map(|r| r.score)
    }

    pub fn failure_for(&self, student_id: &str, topic_id: &str) -> Option<&SessionFailure> {
        self.errors
            .get(student_id)?
            .iter()
            .find(|f| f.topic_id.as_deref() == Some(topic_id))
    }

    /// (student, topic) 是否只出现在一处
    pub fn is_partitioned(&self) -> bool {
        let mut seen = HashSet::new();
        let scored = self
            .scores()
            .all(|r| seen.insert((r.student_id.as_str(), r.topic_id.as_str())));
        let failed = self.errors.values().flatten().all(|f| match &f.topic_id {
            Some(topic) => seen.insert((f.student_id.as_str(), topic.as_str())),
            None => true,
        });
        scored && failed
    }

    /// 预测等级分布（1..=5）
    pub fn level_distribution(&self) -> BTreeMap<u8, usize> {
        let mut dist: BTreeMap<u8, usize> = (SkillLevel::MIN.get()..=SkillLevel::MAX.get())
            .map(|level| (level, 0))
            .collect();
        for record in self.scores() {
            *dist.entry(record.score.get()).or_default() += 1;
        }
        dist
    }

    /// `<output_dir>/<dataset>_<timestamp>.json`
    pub fn default_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_{}.json", self.dataset, self.timestamp))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// 终端摘要：完成 / 失败、耗时、等级分布
    pub fn render_summary(&self) -> String {
        let completed = self.completed();
        let mut out = String::new();
        let _ = writeln!(out, "Dataset: {}", self.dataset);
        let _ = writeln!(
            out,
            "Sessions: {} completed, {} failed ({:.1}s)",
            completed,
            self.failed(),
            self.duration_ms as f64 / 1000.0
        );
        if self.llm_tokens.total > 0 {
            let _ = writeln!(
                out,
                "LLM tokens: {} prompt + {} completion = {}",
                self.llm_tokens.prompt, self.llm_tokens.completion, self.llm_tokens.total
            );
        }
        if completed > 0 {
            let _ = writeln!(out, "Predicted level distribution:");
            for (level, count) in self.level_distribution() {
                let pct = count as f64 * 100.0 / completed as f64;
                let bar = "#".repeat((pct / 5.0).round() as usize);
                let label = SkillLevel::new(level).map(|l| l.label()).unwrap_or("?");
                let _ = writeln!(out, "  {level} {label:<12} {count:>4} ({pct:>5.1}%) {bar}");
            }
        }
        for failure in self.errors.values().flatten() {
            let _ = writeln!(
                out,
                "  ! {}/{}: {}",
                failure.student_id,
                failure.topic_id.as_deref().unwrap_or("*"),
                failure.message
            );
        }
        out
    }
}

/// 提交结果统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionSummary {
    pub succeeded: usize,
    pub failed: Vec<SessionFailure>,
}

impl SubmissionSummary {
    pub fn render(&self) -> String {
        format!(
            "Submissions: {} succeeded, {} failed",
            self.succeeded,
            self.failed.len()
        )
    }
}

/// 逐条提交成绩；单条失败不影响其他条目
pub async fn submit_all(sink: &dyn PredictionSink, report: &BatchReport) -> SubmissionSummary {
    let mut summary = SubmissionSummary::default();
    for record in report.scores() {
        let prediction = Prediction {
            student_id: record.student_id.clone(),
            topic_id: record.topic_id.clone(),
            predicted_level: record.score,
        };
        match sink.submit(&prediction).await {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                tracing::warn!(
                    "submission failed for {}/{}: {}",
                    record.student_id,
                    record.topic_id,
                    e
                );
                summary
                    .failed
                    .push(SessionFailure::session(&record.student_id, &record.topic_id, &e));
            }
        }
    }
    summary
}
