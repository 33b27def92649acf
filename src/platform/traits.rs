//! 学生平台接口：数据源、学生对话通道、预测提交
//!
//! 画像（profile）对引擎是不透明的 JSON，原样透传给判定提供方。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assessment::{SkillLevel, Topic};
use crate::config::Dataset;
use crate::core::AssessError;

/// 数据集中的学生
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub grade_level: u32,
}

/// 一条待提交的预测
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub student_id: String,
    pub topic_id: String,
    pub predicted_level: SkillLevel,
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn list_students(&self, dataset: &Dataset) -> Result<Vec<StudentInfo>, AssessError>;

    async fn list_topics(&self, student_id: &str) -> Result<Vec<Topic>, AssessError>;

    async fn fetch_profile(&self, student_id: &str) -> Result<serde_json::Value, AssessError>;
}

/// 与学生的对话：先 start 拿到会话 id，再逐轮 reply
#[async_trait]
pub trait StudentChannel: Send + Sync {
    async fn start(&self, student_id: &str, topic_id: &str) -> Result<String, AssessError>;

    /// 发送题目，返回学生作答
    async fn reply(&self, conversation_id: &str, message: &str) -> Result<String, AssessError>;
}

/// 预测提交；同一 (student, topic) 以相同分数重复提交不算错误
#[async_trait]
pub trait PredictionSink: Send + Sync {
    async fn submit(&self, prediction: &Prediction) -> Result<(), AssessError>;
}

/// dry_run：只记录日志，总是成功
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait]
impl PredictionSink for DryRunSink {
    async fn submit(&self, prediction: &Prediction) -> Result<(), AssessError> {
        tracing::info!(
            "[dry-run] would submit {}/{} = {}",
            prediction.student_id,
            prediction.topic_id,
            prediction.predicted_level
        );
        Ok(())
    }
}
