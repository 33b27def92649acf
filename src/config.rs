//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SKILLSCOPE__*` 覆盖（双下划线表示嵌套，如 `SKILLSCOPE__ASSESSMENT__MAX_TURNS=5`）。
//! 命令行参数在 main 中最后覆盖；validate() 在任何会话开始前执行，失败即退出。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::core::AssessError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub assessment: AssessmentSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub platform: PlatformSection,
}

/// 数据集选择：mini_dev / dev / test，其余名字视为自定义集合
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Dataset {
    MiniDev,
    Dev,
    Test,
    Custom(String),
}

impl Dataset {
    /// 平台 API 的 set_type 参数
    pub fn set_type(&self) -> &str {
        match self {
            Dataset::MiniDev => "mini_dev",
            Dataset::Dev => "dev",
            Dataset::Test => "test",
            Dataset::Custom(name) => name,
        }
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Dataset::MiniDev
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("dataset name is empty".to_string()),
            "mini_dev" => Ok(Dataset::MiniDev),
            "dev" => Ok(Dataset::Dev),
            "test" => Ok(Dataset::Test),
            other => Ok(Dataset::Custom(other.to_string())),
        }
    }
}

impl TryFrom<String> for Dataset {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.set_type())
    }
}

/// [app] 段：数据集、结果输出、是否提交预测
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default)]
    pub dataset: Dataset,
    /// 结果 JSON 输出目录
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// 评估完成后是否提交预测
    #[serde(default = "default_submit")]
    pub submit: bool,
    /// 只模拟提交（打印日志，不调用平台）
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            dataset: Dataset::default(),
            output_dir: default_output_dir(),
            submit: default_submit(),
            dry_run: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("eval_results")
}

fn default_submit() -> bool {
    true
}

/// [assessment] 段：轮次、早停阈值与各项策略常量
#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentSection {
    /// 每个会话的轮次上限（硬上限）
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// 允许早停前的最少轮次
    #[serde(default = "default_min_turns")]
    pub min_turns: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// 区间收敛且估计稳定需要连续的轮数
    #[serde(default = "default_converged_turns")]
    pub converged_turns: usize,
    #[serde(default = "default_stability_epsilon")]
    pub stability_epsilon: f64,
    /// 置信度饱和尺度 k：confidence = 1 − exp(−Σw/k)
    #[serde(default = "default_confidence_scale")]
    pub confidence_scale: f64,
    /// 整体复核在最终打分中的权重
    #[serde(default = "default_holistic_weight")]
    pub holistic_weight: f64,
    #[serde(default = "default_step")]
    pub correct_step: f64,
    #[serde(default = "default_step")]
    pub incorrect_step: f64,
    /// 部分正确时的权重系数
    #[serde(default = "default_partial_weight")]
    pub partial_weight: f64,
}

impl Default for AssessmentSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            min_turns: default_min_turns(),
            confidence_threshold: default_confidence_threshold(),
            converged_turns: default_converged_turns(),
            stability_epsilon: default_stability_epsilon(),
            confidence_scale: default_confidence_scale(),
            holistic_weight: default_holistic_weight(),
            correct_step: default_step(),
            incorrect_step: default_step(),
            partial_weight: default_partial_weight(),
        }
    }
}

fn default_max_turns() -> usize {
    3
}

fn default_min_turns() -> usize {
    2
}

/// 两轮满置信只有 0.918，区分不了 4 和 5，默认至少要第三轮
fn default_confidence_threshold() -> f64 {
    0.95
}

fn default_converged_turns() -> usize {
    2
}

fn default_stability_epsilon() -> f64 {
    0.5
}

fn default_confidence_scale() -> f64 {
    0.8
}

fn default_holistic_weight() -> f64 {
    0.5
}

fn default_step() -> f64 {
    1.0
}

fn default_partial_weight() -> f64 {
    0.5
}

/// [scheduler] 段：并发预算、单会话超时、协作方重试上限
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// 未设置时使用可用并行度
    pub max_concurrent: Option<usize>,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

impl SchedulerSection {
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            session_timeout_secs: default_session_timeout_secs(),
            retry_limit: default_retry_limit(),
        }
    }
}

fn default_session_timeout_secs() -> u64 {
    300
}

fn default_retry_limit() -> u32 {
    2
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；实际选择还取决于 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 判分要求输出 JSON，默认 0
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            temperature: 0.0,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [platform] 段：学生数据与预测提交 API
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    #[serde(default = "default_platform_url")]
    pub base_url: String,
    /// 也可通过 SKILLSCOPE__PLATFORM__API_KEY 提供
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_key: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_platform_url() -> String {
    "http://localhost:8080".to_string()
}

impl AppConfig {
    /// 启动前校验：任何不一致都在会话开始前失败
    pub fn validate(&self) -> Result<(), AssessError> {
        let a = &self.assessment;
        if a.max_turns == 0 {
            return Err(AssessError::Config("max_turns must be at least 1".into()));
        }
        if a.min_turns > a.max_turns {
            return Err(AssessError::Config(format!(
                "min_turns ({}) > max_turns ({})",
                a.min_turns, a.max_turns
            )));
        }
        check_unit("confidence_threshold", a.confidence_threshold)?;
        check_unit("partial_weight", a.partial_weight)?;
        if a.converged_turns == 0 {
            return Err(AssessError::Config("converged_turns must be at least 1".into()));
        }
        check_non_negative("stability_epsilon", a.stability_epsilon)?;
        check_non_negative("holistic_weight", a.holistic_weight)?;
        check_non_negative("correct_step", a.correct_step)?;
        check_non_negative("incorrect_step", a.incorrect_step)?;
        if !(a.confidence_scale.is_finite() && a.confidence_scale > 0.0) {
            return Err(AssessError::Config(format!(
                "confidence_scale must be positive, got {}",
                a.confidence_scale
            )));
        }

        let t = self.llm.temperature;
        if !(t.is_finite() && (0.0..=2.0).contains(&t)) {
            return Err(AssessError::Config(format!(
                "llm.temperature must be within [0, 2], got {t}"
            )));
        }

        let s = &self.scheduler;
        if s.max_concurrent == Some(0) {
            return Err(AssessError::Config("max_concurrent must be at least 1".into()));
        }
        if s.session_timeout_secs == 0 {
            return Err(AssessError::Config("session_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), AssessError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AssessError::Config(format!("{name} must be within [0,1], got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), AssessError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AssessError::Config(format!("{name} must be non-negative, got {value}")))
    }
}

/// 从 config 目录加载配置，环境变量 SKILLSCOPE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 则追加该文件（可覆盖前面的键）；文件不存在直接报错
/// 3. 最后叠加环境变量 SKILLSCOPE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::Message(format!(
                "config file {} not found",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SKILLSCOPE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.assessment.max_turns, 3);
        assert_eq!(cfg.app.dataset, Dataset::MiniDev);
    }

    #[test]
    fn test_min_turns_above_max_rejected() {
        let mut cfg = AppConfig::default();
        cfg.assessment.min_turns = 4;
        assert!(matches!(cfg.validate(), Err(AssessError::Config(_))));
    }

    #[test]
    fn test_bad_threshold_and_concurrency_rejected() {
        let mut cfg = AppConfig::default();
        cfg.assessment.confidence_threshold = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.scheduler.max_concurrent = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.assessment.confidence_scale = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config(Some(missing)).unwrap_err();
        assert!(err.to_string().contains("not found"));

        let present = dir.path().join("override.toml");
        std::fs::write(&present, "[assessment]\nmax_turns = 5\n").unwrap();
        let cfg = load_config(Some(present)).unwrap();
        assert_eq!(cfg.assessment.max_turns, 5);
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let mut cfg = AppConfig::default();
        cfg.llm.temperature = 3.5;
        assert!(matches!(cfg.validate(), Err(AssessError::Config(_))));
    }

    #[test]
    fn test_dataset_parsing() {
        assert_eq!("dev".parse::<Dataset>().unwrap(), Dataset::Dev);
        assert_eq!(
            "spring_cohort".parse::<Dataset>().unwrap(),
            Dataset::Custom("spring_cohort".into())
        );
        assert!("  ".parse::<Dataset>().is_err());
    }

    #[test]
    fn test_sections_deserialize_from_toml() {
        let raw = r#"
            [app]
            dataset = "test"
            dry_run = true

            [assessment]
            max_turns = 5
            confidence_threshold = 0.8

            [scheduler]
            max_concurrent = 2
        "#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.app.dataset, Dataset::Test);
        assert!(cfg.app.dry_run);
        assert!(cfg.app.submit);
        assert_eq!(cfg.assessment.max_turns, 5);
        assert_eq!(cfg.assessment.min_turns, 2);
        assert_eq!(cfg.scheduler.effective_max_concurrent(), 2);
    }
}
