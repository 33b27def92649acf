//! Skillscope - 自适应技能评估引擎
//!
//! 以尽量少的问答轮次估计学生在某个主题上的 1-5 级水平。
//!
//! 模块划分：
//! - **assessment**: 纯计算的决策组件（难度选择、证据聚合、水平估计、早停、最终打分）
//! - **config**: 应用配置加载（TOML + 环境变量）与启动校验
//! - **core**: 错误与恢复、会话编排、批量调度、引擎构建
//! - **judge**: 判定提供方接口（出题 / 判分 / 复核）与 LLM、规则模拟实现
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **platform**: 学生数据源、对话通道、预测提交（HTTP / 内存）
//! - **report**: 批次报告、摘要与提交统计

pub mod assessment;
pub mod config;
pub mod core;
pub mod judge;
pub mod llm;
pub mod observability;
pub mod platform;
pub mod report;

pub use crate::core::{AssessError, Engine, EngineBuilder};
