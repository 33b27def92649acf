//! 任务调度：批量会话的有界并发执行
//!
//! 每个 (student, topic) 一个 tokio 任务，Semaphore 限制同时运行的会话数；
//! 单会话套 tokio::time::timeout，超时取消该会话的子 token 并记为错误。
//! 任务把结果发到 mpsc 通道，唯一的收集方写 BatchReport；任务 panic 时通道另一端收不到结果，
//! 收集结束后补记为错误，保证每个目标恰好出现一次。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};

use crate::assessment::{SkillLevel, Topic};
use crate::config::{Dataset, SchedulerSection};
use crate::core::{AssessError, RecoveryEngine, SessionOrchestrator, SessionOutcome, SessionSupervisor};
use crate::platform::StudentDirectory;
use crate::report::{BatchReport, ScoreRecord, SessionFailure};

/// 一个待评估的 (student, topic)
#[derive(Debug, Clone)]
pub struct AssessmentTarget {
    pub student_id: String,
    pub topic: Topic,
}

impl AssessmentTarget {
    pub fn new(student_id: impl Into<String>, topic: Topic) -> Self {
        Self {
            student_id: student_id.into(),
            topic,
        }
    }

    fn key(&self) -> (String, String) {
        (self.student_id.clone(), self.topic.id.clone())
    }
}

/// 批次计划：要跑的目标 + 枚举阶段已失败的学生
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub dataset: Dataset,
    pub targets: Vec<AssessmentTarget>,
    pub failures: Vec<SessionFailure>,
}

impl BatchPlan {
    pub fn from_targets(dataset: Dataset, targets: Vec<AssessmentTarget>) -> Self {
        Self {
            dataset,
            targets,
            failures: Vec::new(),
        }
    }

    /// 列出学生及其主题；`only` 非空时只保留其中的学生。
    /// 学生列表拿不到则整批失败；单个学生的主题拿不到只记该学生。
    pub async fn enumerate(
        directory: &dyn StudentDirectory,
        recovery: &RecoveryEngine,
        dataset: &Dataset,
        only: &[String],
    ) -> Result<Self, AssessError> {
        let students = recovery
            .call("list_students", move || directory.list_students(dataset))
            .await?;
        let mut plan = Self::from_targets(dataset.clone(), Vec::new());

        for student in students {
            if !only.is_empty() && !only.contains(&student.id) {
                continue;
            }
            let sid = student.id.as_str();
            match recovery
                .call("list_topics", move || directory.list_topics(sid))
                .await
            {
                Ok(topics) => {
                    tracing::debug!("student {}: {} topics", student.id, topics.len());
                    plan.targets.extend(
                        topics
                            .into_iter()
                            .map(|topic| AssessmentTarget::new(student.id.clone(), topic)),
                    );
                }
                Err(e) => {
                    tracing::warn!("could not list topics for {}: {}", student.id, e);
                    plan.failures.push(SessionFailure::enumeration(&student.id, &e));
                }
            }
        }

        tracing::info!(
            "dataset {}: {} sessions planned, {} students failed enumeration",
            dataset,
            plan.targets.len(),
            plan.failures.len()
        );
        Ok(plan)
    }
}

/// 单会话完成事件（增量进度）
#[derive(Debug, Clone)]
pub struct SessionProgress {
    pub completed: usize,
    pub total: usize,
    pub student_id: String,
    pub topic_id: String,
    pub result: Result<SkillLevel, String>,
}

/// 批量评估调度器
pub struct EvaluationScheduler {
    orchestrator: Arc<SessionOrchestrator>,
    max_concurrent: usize,
    session_timeout: Duration,
    supervisor: SessionSupervisor,
    progress: Option<mpsc::UnboundedSender<SessionProgress>>,
}

impl EvaluationScheduler {
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        max_concurrent: usize,
        session_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            max_concurrent: max_concurrent.max(1),
            session_timeout,
            supervisor: SessionSupervisor::new(),
            progress: None,
        }
    }

    pub fn from_config(orchestrator: Arc<SessionOrchestrator>, config: &SchedulerSection) -> Self {
        Self::new(
            orchestrator,
            config.effective_max_concurrent(),
            Duration::from_secs(config.session_timeout_secs),
        )
    }

    /// 每个会话结束时发送一条进度
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SessionProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 用于外部（如 Ctrl+C）取消整个批次
    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub async fn run(&self, plan: BatchPlan) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::new(&plan.dataset);
        for failure in plan.failures {
            report.record_failure(failure);
        }

        let mut seen = HashSet::new();
        let targets: Vec<AssessmentTarget> = plan
            .targets
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.key());
                if !fresh {
                    tracing::warn!("duplicate target {}/{} skipped", t.student_id, t.topic.id);
                }
                fresh
            })
            .collect();
        let total = targets.len();
        tracing::info!(
            "running {} sessions with concurrency {}",
            total,
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<SessionOutcome, AssessError>)>(total.max(1));

        for (index, target) in targets.iter().cloned().enumerate() {
            let orchestrator = self.orchestrator.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let cancel = self.supervisor.child_token();
            let timeout = self.session_timeout;

            tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let session = orchestrator.run(&target.student_id, target.topic, cancel.clone());
                        match tokio::time::timeout(timeout, session).await {
                            Ok(result) => result,
                            Err(_) => {
                                cancel.cancel();
                                Err(AssessError::Timeout(timeout))
                            }
                        }
                    }
                    Err(_) => Err(AssessError::Cancelled),
                };
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut reported = vec![false; total];
        let mut completed = 0;
        while let Some((index, result)) = rx.recv().await {
            let Some(target) = targets.get(index) else {
                continue;
            };
            reported[index] = true;
            completed += 1;

            let progress_result = match result {
                Ok(outcome) => {
                    let score = outcome.score;
                    report.record_success(ScoreRecord::from(&outcome));
                    Ok(score)
                }
                Err(e) => {
                    tracing::error!(
                        "session {}/{} failed: {}",
                        target.student_id,
                        target.topic.id,
                        e
                    );
                    report.record_failure(SessionFailure::session(
                        &target.student_id,
                        &target.topic.id,
                        &e,
                    ));
                    Err(e.to_string())
                }
            };

            tracing::info!("progress {}/{}", completed, total);
            if let Some(progress) = &self.progress {
                let _ = progress.send(SessionProgress {
                    completed,
                    total,
                    student_id: target.student_id.clone(),
                    topic_id: target.topic.id.clone(),
                    result: progress_result,
                });
            }
        }

        for (target, _) in targets.iter().zip(&reported).filter(|(_, done)| !**done) {
            tracing::error!(
                "session {}/{} ended without a result",
                target.student_id,
                target.topic.id
            );
            report.record_failure(SessionFailure {
                student_id: target.student_id.clone(),
                topic_id: Some(target.topic.id.clone()),
                message: "session task aborted before reporting".to_string(),
            });
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "batch finished: {} completed, {} failed in {}ms",
            report.completed(),
            report.failed(),
            report.duration_ms
        );
        report
    }
}
