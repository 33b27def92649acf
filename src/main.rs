//! Skillscope - 批量评估入口
//!
//! 加载配置并应用命令行覆盖 → 校验（失败即退出）→ 枚举学生与主题 → 并发评估 → 写报告 → 提交预测 → 打印摘要。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use skillscope::config::{load_config, AppConfig, Dataset};
use skillscope::{observability, EngineBuilder};

/// 自适应技能评估：为每个 (student, topic) 估计 1-5 级水平
#[derive(Parser, Debug)]
#[command(name = "skillscope", version, about)]
struct Args {
    /// 数据集：mini_dev / dev / test / 自定义名字
    #[arg(long)]
    dataset: Option<Dataset>,

    /// 每个会话的轮次上限
    #[arg(long)]
    max_turns: Option<usize>,

    /// 允许早停前的最少轮次
    #[arg(long)]
    min_turns: Option<usize>,

    /// 早停置信度阈值 [0,1]
    #[arg(long)]
    confidence_threshold: Option<f64>,

    /// 同时运行的会话数（默认可用并行度）
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// 评估完成后提交预测
    #[arg(long, overrides_with = "no_submit")]
    submit: bool,

    /// 不提交预测
    #[arg(long)]
    no_submit: bool,

    /// 只模拟提交
    #[arg(long)]
    dry_run: bool,

    /// 报告输出路径（默认 eval_results/<dataset>_<timestamp>.json）
    #[arg(long)]
    output: Option<PathBuf>,

    /// 只评估这些学生（可重复）
    #[arg(long = "student")]
    students: Vec<String>,

    /// 额外的配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(dataset) = &self.dataset {
            cfg.app.dataset = dataset.clone();
        }
        if let Some(n) = self.max_turns {
            cfg.assessment.max_turns = n;
        }
        if let Some(n) = self.min_turns {
            cfg.assessment.min_turns = n;
        }
        if let Some(t) = self.confidence_threshold {
            cfg.assessment.confidence_threshold = t;
        }
        if let Some(n) = self.max_concurrent {
            cfg.scheduler.max_concurrent = Some(n);
        }
        if self.submit {
            cfg.app.submit = true;
        }
        if self.no_submit {
            cfg.app.submit = false;
        }
        if self.dry_run {
            cfg.app.dry_run = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    observability::init();

    let mut cfg = load_config(args.config.clone()).context("Failed to load configuration")?;
    args.apply(&mut cfg);

    let output_dir = cfg.app.output_dir.clone();
    let engine = EngineBuilder::new(cfg)
        .build()
        .context("Invalid configuration")?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let engine = engine.with_progress(progress_tx);
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match &event.result {
                Ok(level) => println!(
                    "[{}/{}] {}/{} -> {}",
                    event.completed, event.total, event.student_id, event.topic_id, level
                ),
                Err(e) => println!(
                    "[{}/{}] {}/{} failed: {}",
                    event.completed, event.total, event.student_id, event.topic_id, e
                ),
            }
        }
    });

    let supervisor = engine.scheduler().supervisor().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, cancelling remaining sessions");
            supervisor.cancel();
        }
    });

    tracing::info!(
        "Evaluating dataset {} (max_turns={}, min_turns={}, threshold={})",
        engine.config().app.dataset,
        engine.config().assessment.max_turns,
        engine.config().assessment.min_turns,
        engine.config().assessment.confidence_threshold
    );

    let report = engine
        .run(&args.students)
        .await
        .context("Failed to enumerate students")?;

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| report.default_path(&output_dir));
    report
        .save(&path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());

    let submission = engine.submit(&report).await;

    println!();
    print!("{}", report.render_summary());
    if let Some(summary) = submission {
        println!("{}", summary.render());
        for failure in &summary.failed {
            println!(
                "  ! {}/{}: {}",
                failure.student_id,
                failure.topic_id.as_deref().unwrap_or("*"),
                failure.message
            );
        }
    }
    println!("Results: {}", path.display());

    Ok(())
}
