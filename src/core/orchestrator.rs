//! 会话编排器：单个 (student, topic) 的主控循环
//!
//! INIT 建立中性先验并开启对话；QUESTIONING 每轮依次执行
//! 选难度 → 出题 → 学生作答 → 判分 → 聚合证据 → 更新估计 → 收缩区间 → 记录 → 早停检查；
//! 早停触发后进入 TERMINATED，同步调用 FinalScoringCombiner 得到最终分数。
//! 外部调用失败经 RecoveryEngine 有限重试后上抛（向学生发题除外，只发一次），整个会话作废，不产出部分结果。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::assessment::{
    AssessmentStats, DifficultySelector, EarlyStopping, EvidenceAggregator, FinalScoringCombiner,
    HolisticReview, Judgment, LevelEstimate, LevelEstimator, QaPair, SessionState, SkillLevel,
    StopReason, Topic,
};
use crate::config::AssessmentSection;
use crate::core::{AssessError, RecoveryEngine, SessionPhase, SessionSnapshot};
use crate::judge::{JudgmentProvider, QuestionRequest};
use crate::platform::{StudentChannel, StudentDirectory};

/// 单会话结果
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub student_id: String,
    pub topic_id: String,
    pub score: SkillLevel,
    pub turns: usize,
    pub stop_reason: StopReason,
    pub estimate: LevelEstimate,
    pub review: HolisticReview,
    pub transcript: Vec<QaPair>,
    pub stats: AssessmentStats,
    pub duration_ms: u64,
}

/// 会话编排器：无会话状态，可在多个并发会话间共享（Arc）
pub struct SessionOrchestrator {
    judge: Arc<dyn JudgmentProvider>,
    directory: Arc<dyn StudentDirectory>,
    channel: Arc<dyn StudentChannel>,
    recovery: RecoveryEngine,
    selector: DifficultySelector,
    aggregator: EvidenceAggregator,
    estimator: LevelEstimator,
    stopping: EarlyStopping,
    combiner: FinalScoringCombiner,
}

impl SessionOrchestrator {
    pub fn new(
        judge: Arc<dyn JudgmentProvider>,
        directory: Arc<dyn StudentDirectory>,
        channel: Arc<dyn StudentChannel>,
        policy: &AssessmentSection,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            judge,
            directory,
            channel,
            recovery,
            selector: DifficultySelector::new(),
            aggregator: EvidenceAggregator::from_config(policy),
            estimator: LevelEstimator::new(policy.confidence_scale),
            stopping: EarlyStopping::from_config(policy),
            combiner: FinalScoringCombiner::new(policy.holistic_weight),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.stopping.max_turns()
    }

    /// 运行一个完整会话
    pub async fn run(
        &self,
        student_id: &str,
        topic: Topic,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, AssessError> {
        self.run_observed(student_id, topic, cancel, None).await
    }

    /// 运行会话，并在每次阶段变化 / 每轮结束后向 observer 发送快照
    pub async fn run_observed(
        &self,
        student_id: &str,
        topic: Topic,
        cancel: CancellationToken,
        observer: Option<watch::Sender<SessionSnapshot>>,
    ) -> Result<SessionOutcome, AssessError> {
        let state = SessionState::new(student_id, topic);
        let span = tracing::info_span!(
            "session",
            student = %state.student_id,
            topic = %state.topic.id,
            uuid = %state.session_id
        );
        self.drive(state, cancel, observer).instrument(span).await
    }

    async fn drive(
        &self,
        mut state: SessionState,
        cancel: CancellationToken,
        observer: Option<watch::Sender<SessionSnapshot>>,
    ) -> Result<SessionOutcome, AssessError> {
        let started = Instant::now();
        let publish = |state: &SessionState, phase: SessionPhase| {
            let snapshot = SessionSnapshot::project(state, phase);
            tracing::trace!(?snapshot, "session snapshot");
            if let Some(tx) = &observer {
                let _ = tx.send(snapshot);
            }
        };

        // INIT
        publish(&state, SessionPhase::Init);
        let student_id = state.student_id.clone();
        let topic = state.topic.clone();
        let judge = self.judge.as_ref();
        let directory = self.directory.as_ref();
        let channel = self.channel.as_ref();

        let (sid, tid) = (student_id.as_str(), topic.id.as_str());
        let profile = self
            .recovery
            .call("fetch_profile", move || directory.fetch_profile(sid))
            .await?;
        let conversation = self
            .recovery
            .call("start_conversation", move || channel.start(sid, tid))
            .await?;
        tracing::info!(conversation = %conversation, "session started");

        // QUESTIONING
        loop {
            if cancel.is_cancelled() {
                tracing::warn!("session cancelled at turn {}", state.turn);
                return Err(AssessError::Cancelled);
            }

            let difficulty = self.selector.select(&state.estimate, &state.transcript);
            let history = state.transcript.as_slice();
            let (topic_ref, profile_ref) = (&topic, &profile);

            let question = self
                .recovery
                .call("ask_question", move || {
                    judge.ask_question(QuestionRequest {
                        topic: topic_ref,
                        difficulty,
                        history,
                        profile: profile_ref,
                    })
                })
                .await?;

            // 发题不幂等：重发会让学生看到同一道题两次，失败直接上抛
            let question_ref = question.as_str();
            let response = channel.reply(&conversation, question_ref).await?;

            let response_ref = response.as_str();
            let judgment = self
                .recovery
                .call("judge_response", move || async move {
                    judge
                        .judge_response(topic_ref, question_ref, difficulty, response_ref)
                        .await
                        .and_then(Judgment::validated)
                })
                .await?;

            let qa = QaPair {
                turn: state.turn + 1,
                question,
                difficulty,
                response,
                judgment,
            };
            let evidence = self.aggregator.aggregate(&qa);
            let (estimate, totals) = self.estimator.update(&state.estimate, &state.totals, &evidence);
            let interval = state.interval.narrow(difficulty, judgment.correctness);
            state.record_turn(qa, estimate, totals, interval);

            tracing::debug!(
                "turn {}: difficulty {} -> {:?}, estimate {:.2} (conf {:.2}), interval [{}, {}]",
                state.turn,
                difficulty,
                judgment.correctness,
                estimate.value,
                estimate.confidence,
                interval.lo,
                interval.hi
            );
            publish(&state, SessionPhase::Questioning);

            let decision = self.stopping.should_stop(&state);
            if decision.stop {
                let reason = decision.reason.unwrap_or(StopReason::MaxTurns);
                tracing::info!(
                    "stopping after {} turns ({}): {}",
                    state.turn,
                    reason,
                    decision.message.as_deref().unwrap_or_default()
                );
                state.terminate(reason);
                break;
            }
        }

        // TERMINATED
        let (score, review) = self
            .combiner
            .combine(judge, &self.recovery, &topic, &state.estimate, &state.transcript)
            .await?;
        state.stats.final_score = Some(score);
        publish(&state, SessionPhase::Terminated);

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "final level {} (running {:.2}, holistic {}) in {}ms",
            score,
            state.estimate.value,
            review.level,
            duration_ms
        );

        Ok(SessionOutcome {
            student_id: state.student_id,
            topic_id: state.topic.id,
            score,
            turns: state.turn,
            stop_reason: state.stop_reason.unwrap_or(StopReason::MaxTurns),
            estimate: state.estimate,
            review,
            transcript: state.transcript,
            stats: state.stats,
            duration_ms,
        })
    }
}
