//! 引擎构建器：统一的初始化逻辑
//!
//! 从 AppConfig 选择 LLM 后端、构建判定提供方与平台客户端，组装 SessionOrchestrator 与 EvaluationScheduler。
//! 测试与离线运行可以注入自己的判定提供方和平台实现。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{AppConfig, LlmSection};
use crate::core::{
    AssessError, BatchPlan, EvaluationScheduler, RecoveryEngine, SessionOrchestrator,
    SessionProgress,
};
use crate::judge::{JudgmentProvider, LlmJudge};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::platform::{
    DryRunSink, PlatformClient, PredictionSink, StudentChannel, StudentDirectory,
};
use crate::report::{submit_all, BatchReport, LlmTokens, SubmissionSummary};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient::new());
    }

    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = has_deepseek || (provider == "deepseek" && has_openai);
    let use_openai = has_openai && provider != "deepseek";

    if use_deepseek {
        let client = create_deepseek_client(cfg);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        let client = OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, None)
            .with_request_timeout(Duration::from_secs(cfg.request_timeout_secs))
            .with_temperature(cfg.temperature);
        tracing::info!("Using OpenAI LLM ({})", client.model());
        Arc::new(client)
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 引擎构建器：未注入的部分按配置构建
pub struct EngineBuilder {
    config: AppConfig,
    judge: Option<Arc<dyn JudgmentProvider>>,
    directory: Option<Arc<dyn StudentDirectory>>,
    channel: Option<Arc<dyn StudentChannel>>,
    sink: Option<Arc<dyn PredictionSink>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            judge: None,
            directory: None,
            channel: None,
            sink: None,
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgmentProvider>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// 同一个对象同时充当数据源、对话通道与提交端
    pub fn with_platform<P>(mut self, platform: Arc<P>) -> Self
    where
        P: StudentDirectory + StudentChannel + PredictionSink + 'static,
    {
        self.directory = Some(platform.clone());
        self.channel = Some(platform.clone());
        self.sink = Some(platform);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 校验配置并组装引擎；配置错误在任何会话开始前返回
    pub fn build(self) -> Result<Engine, AssessError> {
        self.config.validate()?;

        let recovery = RecoveryEngine::new(self.config.scheduler.retry_limit);
        let judge = match self.judge {
            Some(judge) => judge,
            None => Arc::new(LlmJudge::new(create_llm_from_config(&self.config.llm))),
        };

        let (directory, channel, sink) = match (self.directory, self.channel, self.sink) {
            (Some(d), Some(c), Some(s)) => (d, c, s),
            _ => {
                let client = Arc::new(PlatformClient::from_config(
                    &self.config.platform,
                    &self.config.app.dataset,
                ));
                tracing::info!("Using student platform at {}", self.config.platform.base_url);
                let directory: Arc<dyn StudentDirectory> = client.clone();
                let channel: Arc<dyn StudentChannel> = client.clone();
                let sink: Arc<dyn PredictionSink> = client;
                (directory, channel, sink)
            }
        };
        let sink: Arc<dyn PredictionSink> = if self.config.app.dry_run {
            Arc::new(DryRunSink)
        } else {
            sink
        };

        let orchestrator = Arc::new(SessionOrchestrator::new(
            judge.clone(),
            directory.clone(),
            channel,
            &self.config.assessment,
            recovery.clone(),
        ));
        let scheduler = EvaluationScheduler::from_config(orchestrator, &self.config.scheduler);

        Ok(Engine {
            config: self.config,
            judge,
            recovery,
            directory,
            sink,
            scheduler,
        })
    }
}

/// 组装好的评估引擎
pub struct Engine {
    config: AppConfig,
    judge: Arc<dyn JudgmentProvider>,
    recovery: RecoveryEngine,
    directory: Arc<dyn StudentDirectory>,
    sink: Arc<dyn PredictionSink>,
    scheduler: EvaluationScheduler,
}

impl Engine {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &EvaluationScheduler {
        &self.scheduler
    }

    /// 每个会话结束时向 tx 发送进度
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SessionProgress>) -> Self {
        self.scheduler = self.scheduler.with_progress(tx);
        self
    }

    /// 枚举配置的数据集；`only` 非空时只评估这些学生
    pub async fn plan(&self, only: &[String]) -> Result<BatchPlan, AssessError> {
        BatchPlan::enumerate(
            self.directory.as_ref(),
            &self.recovery,
            &self.config.app.dataset,
            only,
        )
        .await
    }

    /// 跑完整批；报告里带上判定提供方累计的 token 用量
    pub async fn run(&self, only: &[String]) -> Result<BatchReport, AssessError> {
        let plan = self.plan(only).await?;
        let mut report = self.scheduler.run(plan).await;
        report.llm_tokens = LlmTokens::from(self.judge.token_usage());
        Ok(report)
    }

    /// submit 关闭时返回 None
    pub async fn submit(&self, report: &BatchReport) -> Option<SubmissionSummary> {
        if !self.config.app.submit {
            tracing::info!("Submission disabled, skipping");
            return None;
        }
        Some(submit_all(self.sink.as_ref(), report).await)
    }
}
