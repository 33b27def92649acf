//! 评估流程集成测试：脚本化判定 + 内存平台

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use skillscope::assessment::{
        Correctness, FinalScoringCombiner, HolisticReview, Judgment, LevelEstimate, QaPair,
        SkillLevel, StopReason, Topic,
    };
    use skillscope::config::{AppConfig, AssessmentSection, Dataset};
    use skillscope::core::{
        AssessError, AssessmentTarget, BatchPlan, EngineBuilder, EvaluationScheduler,
        RecoveryEngine, SessionOrchestrator,
    };
    use skillscope::judge::{difficulty_tag, JudgmentProvider, QuestionRequest, SimulatedJudge};
    use skillscope::platform::InMemoryPlatform;

    type Answer = dyn Fn(SkillLevel, usize) -> Correctness + Send + Sync;

    /// 脚本化判定：按 (难度, 第几次判分) 给出结果，复核返回固定等级
    struct ScriptedJudge {
        answer: Box<Answer>,
        review: SkillLevel,
        confidence: f64,
        judged: AtomicUsize,
    }

    impl ScriptedJudge {
        fn new(
            answer: impl Fn(SkillLevel, usize) -> Correctness + Send + Sync + 'static,
            review: SkillLevel,
        ) -> Self {
            Self {
                answer: Box::new(answer),
                review,
                confidence: 1.0,
                judged: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JudgmentProvider for ScriptedJudge {
        async fn ask_question(&self, request: QuestionRequest<'_>) -> Result<String, AssessError> {
            Ok(format!(
                "[difficulty {}] question {} on {}",
                request.difficulty,
                request.history.len() + 1,
                request.topic.id
            ))
        }

        async fn judge_response(
            &self,
            _topic: &Topic,
            question: &str,
            difficulty: SkillLevel,
            _response: &str,
        ) -> Result<Judgment, AssessError> {
            assert_eq!(difficulty_tag(question), Some(difficulty));
            let n = self.judged.fetch_add(1, Ordering::SeqCst);
            match (self.answer)(difficulty, n) {
                Correctness::Partial => Judgment::partial(0.5, self.confidence),
                other => Judgment::new(other, self.confidence),
            }
        }

        async fn review_transcript(
            &self,
            _topic: &Topic,
            _transcript: &[QaPair],
        ) -> Result<HolisticReview, AssessError> {
            HolisticReview::new(self.review, 0.9)
        }
    }

    fn policy(max_turns: usize, min_turns: usize, confidence_threshold: f64) -> AssessmentSection {
        AssessmentSection {
            max_turns,
            min_turns,
            confidence_threshold,
            ..AssessmentSection::default()
        }
    }

    fn orchestrator(judge: impl JudgmentProvider + 'static, policy: &AssessmentSection) -> SessionOrchestrator {
        let platform = Arc::new(InMemoryPlatform::new().with_student("s1", [("t1", 3)]));
        SessionOrchestrator::new(
            Arc::new(judge),
            platform.clone(),
            platform,
            policy,
            RecoveryEngine::new(1).with_backoff(Duration::ZERO),
        )
    }

    fn difficulties(transcript: &[QaPair]) -> Vec<u8> {
        transcript.iter().map(|qa| qa.difficulty.get()).collect()
    }

    #[tokio::test]
    async fn test_all_correct_converges_to_five() {
        let judge = ScriptedJudge::new(|_, _| Correctness::Correct, SkillLevel::ADVANCED);
        let orch = orchestrator(judge, &policy(3, 3, 0.9));
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(difficulties(&outcome.transcript), vec![3, 4, 5]);
        assert!(outcome.stats.snapshots.last().unwrap().interval.is_converged());
        assert_eq!(outcome.score, SkillLevel::ADVANCED);
    }

    #[tokio::test]
    async fn test_all_incorrect_converges_to_one() {
        let judge = ScriptedJudge::new(|_, _| Correctness::Incorrect, SkillLevel::STRUGGLING);
        let orch = orchestrator(judge, &policy(3, 3, 1.0));
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(difficulties(&outcome.transcript), vec![3, 2, 1]);
        assert!(outcome.stats.snapshots.last().unwrap().interval.is_converged());
        assert_eq!(outcome.score, SkillLevel::STRUGGLING);
    }

    #[tokio::test]
    async fn test_all_incorrect_with_defaults_scores_one() {
        let judge = ScriptedJudge::new(|_, _| Correctness::Incorrect, SkillLevel::STRUGGLING);
        let orch = orchestrator(judge, &AssessmentSection::default());
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.score, SkillLevel::STRUGGLING);
    }

    #[tokio::test]
    async fn test_confident_session_stops_at_turn_two() {
        let judge = ScriptedJudge::new(
            |d, _| {
                if d <= SkillLevel::AT_GRADE {
                    Correctness::Correct
                } else {
                    Correctness::Incorrect
                }
            },
            SkillLevel::AT_GRADE,
        );
        // k = 0.6：两轮满置信 1 − e^(−2/0.6) ≈ 0.964
        let fast = AssessmentSection {
            confidence_scale: 0.6,
            ..policy(3, 2, 0.9)
        };
        let orch = orchestrator(judge, &fast);
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.stop_reason, StopReason::Confident);
        assert!(outcome.estimate.confidence >= 0.95);
    }

    #[tokio::test]
    async fn test_min_turns_delays_early_stop() {
        let judge = ScriptedJudge::new(|_, _| Correctness::Correct, SkillLevel::ADVANCED);
        let orch = orchestrator(judge, &policy(6, 4, 0.5));
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.turns, 4);
        assert_ne!(outcome.stop_reason, StopReason::MaxTurns);
    }

    #[tokio::test]
    async fn test_every_pattern_terminates_within_ceiling() {
        let patterns: Vec<Box<Answer>> = vec![
            Box::new(|_: SkillLevel, _: usize| Correctness::Correct),
            Box::new(|_: SkillLevel, _: usize| Correctness::Incorrect),
            Box::new(|_: SkillLevel, _: usize| Correctness::Partial),
            Box::new(|_: SkillLevel, n: usize| {
                if n % 2 == 0 {
                    Correctness::Correct
                } else {
                    Correctness::Incorrect
                }
            }),
            Box::new(|d: SkillLevel, n: usize| match (d.get() as usize + n) % 3 {
                0 => Correctness::Correct,
                1 => Correctness::Partial,
                _ => Correctness::Incorrect,
            }),
        ];

        for (i, answer) in patterns.into_iter().enumerate() {
            let judge = ScriptedJudge {
                answer,
                review: SkillLevel::AT_GRADE,
                confidence: 0.7,
                judged: AtomicUsize::new(0),
            };
            let orch = orchestrator(judge, &policy(5, 5, 1.0));
            let outcome = orch
                .run("s1", Topic::bare("t1"), CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.turns, 5, "pattern {i}");

            let mut last_conf = 0.0;
            let mut last_width = 4;
            for snap in &outcome.stats.snapshots {
                assert!((1.0..=5.0).contains(&snap.estimate.value), "pattern {i}");
                assert!(snap.estimate.confidence >= last_conf, "pattern {i}");
                assert!(snap.interval.lo <= snap.interval.hi, "pattern {i}");
                assert!(snap.interval.width() <= last_width, "pattern {i}");
                last_conf = snap.estimate.confidence;
                last_width = snap.interval.width();
            }
        }
    }

    #[tokio::test]
    async fn test_ceiling_holds_for_each_policy() {
        for (max_turns, min_turns, threshold) in [(5, 5, 1.0), (5, 1, 0.9), (1, 1, 0.9), (2, 0, 0.0)] {
            let judge = ScriptedJudge::new(
                |_, n| if n % 2 == 0 { Correctness::Correct } else { Correctness::Incorrect },
                SkillLevel::AT_GRADE,
            );
            let orch = orchestrator(judge, &policy(max_turns, min_turns, threshold));
            let outcome = orch
                .run("s1", Topic::bare("t1"), CancellationToken::new())
                .await
                .unwrap();
            assert!(outcome.turns <= max_turns);
            if min_turns == max_turns {
                assert_eq!(outcome.turns, max_turns);
                assert_eq!(outcome.stop_reason, StopReason::MaxTurns);
            }
        }
    }

    #[tokio::test]
    async fn test_combiner_is_deterministic() {
        let judge = SimulatedJudge::default();
        let combiner = FinalScoringCombiner::new(0.5);
        let recovery = RecoveryEngine::new(0);
        let topic = Topic::bare("t1");
        let running = LevelEstimate {
            value: 3.4,
            confidence: 0.7,
            turn: 3,
        };
        let transcript = vec![QaPair {
            turn: 1,
            question: "[difficulty 3] q".into(),
            difficulty: SkillLevel::AT_GRADE,
            response: "correct".into(),
            judgment: Judgment::correct(1.0).unwrap(),
        }];

        let (first, _) = combiner
            .combine(&judge, &recovery, &topic, &running, &transcript)
            .await
            .unwrap();
        let (second, _) = combiner
            .combine(&judge, &recovery, &topic, &running, &transcript)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    fn batch_scheduler(
        platform: InMemoryPlatform,
        judge: SimulatedJudge,
        timeout: Duration,
    ) -> EvaluationScheduler {
        let platform = Arc::new(platform);
        let orch = SessionOrchestrator::new(
            Arc::new(judge),
            platform.clone(),
            platform,
            &AssessmentSection::default(),
            RecoveryEngine::new(1).with_backoff(Duration::ZERO),
        );
        EvaluationScheduler::new(Arc::new(orch), 4, timeout)
    }

    fn targets(pairs: &[(&str, &str)]) -> BatchPlan {
        BatchPlan::from_targets(
            Dataset::MiniDev,
            pairs
                .iter()
                .map(|(s, t)| AssessmentTarget::new(*s, Topic::bare(*t)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_isolated() {
        let platform = InMemoryPlatform::new()
            .with_student("s1", [("algebra", 3)])
            .with_student("s2", [("geometry", 2), ("bad-topic", 4)])
            .with_student("s3", [("algebra", 5)]);
        let sched = batch_scheduler(
            platform,
            SimulatedJudge::default().failing_on("bad-topic"),
            Duration::from_secs(5),
        );

        let report = sched
            .run(targets(&[
                ("s1", "algebra"),
                ("s2", "geometry"),
                ("s2", "bad-topic"),
                ("s3", "algebra"),
            ]))
            .await;

        assert_eq!(report.completed(), 3);
        assert_eq!(report.failed(), 1);
        assert!(report.failure_for("s2", "bad-topic").is_some());
        assert!(report.score_for("s2", "geometry").is_some());
        assert!(report.errors.get("s1").is_none());
        assert!(report.errors.get("s3").is_none());
        assert!(report.is_partitioned());
    }

    #[tokio::test]
    async fn test_session_timeout_is_recorded_as_error() {
        let platform = InMemoryPlatform::new()
            .with_student("fast", [("t1", 3)])
            .with_student("slow", [("t1", 3)])
            .with_reply_delay("slow", Duration::from_millis(500));
        let sched = batch_scheduler(platform, SimulatedJudge::default(), Duration::from_millis(100));

        let report = sched.run(targets(&[("fast", "t1"), ("slow", "t1")])).await;

        assert!(report.score_for("fast", "t1").is_some());
        let failure = report.failure_for("slow", "t1").unwrap();
        assert!(failure.message.contains("timed out"));
        assert!(report.is_partitioned());
    }

    #[tokio::test]
    async fn test_batch_scores_track_true_levels() {
        let platform = InMemoryPlatform::new()
            .with_student("s1", [("t1", 1)])
            .with_student("s2", [("t1", 2)])
            .with_student("s3", [("t1", 3)])
            .with_student("s4", [("t1", 4)])
            .with_student("s5", [("t1", 5)]);
        let sched = batch_scheduler(platform, SimulatedJudge::default(), Duration::from_secs(5));
        let report = sched
            .run(targets(&[
                ("s1", "t1"),
                ("s2", "t1"),
                ("s3", "t1"),
                ("s4", "t1"),
                ("s5", "t1"),
            ]))
            .await;

        for (student, level) in [("s1", 1u8), ("s2", 2), ("s3", 3), ("s4", 4), ("s5", 5)] {
            assert_eq!(
                report.score_for(student, "t1"),
                SkillLevel::new(level),
                "student {student}"
            );
        }
    }

    #[tokio::test]
    async fn test_perfect_student_with_default_policy() {
        let platform = Arc::new(InMemoryPlatform::new().with_student("s1", [("t1", 5)]));
        let orch = SessionOrchestrator::new(
            Arc::new(SimulatedJudge::default()),
            platform.clone(),
            platform,
            &AssessmentSection::default(),
            RecoveryEngine::new(1).with_backoff(Duration::ZERO),
        );
        let outcome = orch
            .run("s1", Topic::bare("t1"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(difficulties(&outcome.transcript), vec![3, 4, 5]);
        assert_eq!(outcome.review.level, SkillLevel::ADVANCED);
        assert_eq!(outcome.score, SkillLevel::ADVANCED);
    }

    #[tokio::test]
    async fn test_engine_end_to_end_with_rejected_submission() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_student("s1", [("t1", 3), ("t2", 4)])
                .with_student("s2", [("t1", 2)])
                .rejecting_submission("s1", "t2"),
        );
        let engine = EngineBuilder::new(AppConfig::default())
            .with_judge(Arc::new(SimulatedJudge::default()))
            .with_platform(platform.clone())
            .build()
            .unwrap();

        let report = engine.run(&[]).await.unwrap();
        assert_eq!(report.completed(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = report.default_path(dir.path());
        report.save(&path).unwrap();
        assert!(path.exists());

        let summary = engine.submit(&report).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(platform.submitted().len(), 2);
    }

    #[test]
    fn test_inconsistent_config_fails_fast() {
        let mut config = AppConfig::default();
        config.assessment.max_turns = 2;
        config.assessment.min_turns = 3;
        let result = EngineBuilder::new(config)
            .with_judge(Arc::new(SimulatedJudge::default()))
            .with_platform(Arc::new(InMemoryPlatform::new()))
            .build();
        assert!(matches!(result, Err(AssessError::Config(_))));
    }
}
