//! 内存版学生平台（离线运行与测试）
//!
//! 每个 (student, topic) 有一个真实等级；模拟学生读取题目里的难度标签，
//! 难度不高于真实等级就答对。可注入故障：列主题失败、作答失败、作答延迟、提交被拒。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::assessment::{SkillLevel, Topic};
use crate::config::Dataset;
use crate::core::AssessError;
use crate::judge::difficulty_tag;
use crate::platform::{Prediction, PredictionSink, StudentChannel, StudentDirectory, StudentInfo};

#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    students: Vec<StudentInfo>,
    topics: HashMap<String, Vec<Topic>>,
    true_levels: HashMap<(String, String), SkillLevel>,
    failing_directory: HashSet<String>,
    reply_delays: HashMap<String, Duration>,
    /// 学生 → 还要失败的作答次数
    reply_failures: Mutex<HashMap<String, usize>>,
    replies: AtomicUsize,
    rejected_submissions: HashSet<(String, String)>,
    conversations: Mutex<HashMap<String, (String, String)>>,
    submissions: Mutex<HashMap<(String, String), SkillLevel>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加学生及其主题（主题 id 与真实等级）
    pub fn with_student<I, S>(mut self, student_id: &str, topics: I) -> Self
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        self.students.push(StudentInfo {
            id: student_id.to_string(),
            name: student_id.to_string(),
            grade_level: 8,
        });
        let entry = self.topics.entry(student_id.to_string()).or_default();
        for (topic_id, level) in topics {
            let topic_id = topic_id.into();
            let level = SkillLevel::new(level).unwrap_or(SkillLevel::AT_GRADE);
            self.true_levels
                .insert((student_id.to_string(), topic_id.clone()), level);
            entry.push(Topic::bare(topic_id));
        }
        self
    }

    /// 该学生的 list_topics / fetch_profile 失败
    pub fn failing_directory_for(mut self, student_id: &str) -> Self {
        self.failing_directory.insert(student_id.to_string());
        self
    }

    /// 该学生每次作答前等待
    pub fn with_reply_delay(mut self, student_id: &str, delay: Duration) -> Self {
        self.reply_delays.insert(student_id.to_string(), delay);
        self
    }

    /// 该学生接下来的 n 次作答返回协作方错误
    pub fn failing_replies_for(self, student_id: &str, n: usize) -> Self {
        if let Ok(mut failures) = self.reply_failures.lock() {
            failures.insert(student_id.to_string(), n);
        }
        self
    }

    /// 收到过的作答请求数（含失败的）
    pub fn reply_calls(&self) -> usize {
        self.replies.load(Ordering::SeqCst)
    }

    pub fn rejecting_submission(mut self, student_id: &str, topic_id: &str) -> Self {
        self.rejected_submissions
            .insert((student_id.to_string(), topic_id.to_string()));
        self
    }

    /// 已接受的提交
    pub fn submitted(&self) -> HashMap<(String, String), SkillLevel> {
        self.submissions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn true_level(&self, student_id: &str, topic_id: &str) -> Option<SkillLevel> {
        self.true_levels
            .get(&(student_id.to_string(), topic_id.to_string()))
            .copied()
    }

    fn check_directory(&self, student_id: &str) -> Result<(), AssessError> {
        if self.failing_directory.contains(student_id) {
            return Err(AssessError::collaborator(
                "student directory",
                format!("lookup failed for {student_id}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StudentDirectory for InMemoryPlatform {
    async fn list_students(&self, _dataset: &Dataset) -> Result<Vec<StudentInfo>, AssessError> {
        Ok(self.students.clone())
    }

    async fn list_topics(&self, student_id: &str) -> Result<Vec<Topic>, AssessError> {
        self.check_directory(student_id)?;
        Ok(self.topics.get(student_id).cloned().unwrap_or_default())
    }

    async fn fetch_profile(&self, student_id: &str) -> Result<serde_json::Value, AssessError> {
        self.check_directory(student_id)?;
        let student = self.students.iter().find(|s| s.id == student_id);
        Ok(match student {
            Some(s) => json!({ "id": s.id, "name": s.name, "grade_level": s.grade_level }),
            None => json!({ "id": student_id }),
        })
    }
}

#[async_trait]
impl StudentChannel for InMemoryPlatform {
    async fn start(&self, student_id: &str, topic_id: &str) -> Result<String, AssessError> {
        let conversation_id = format!("conv-{}", Uuid::new_v4());
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|e| AssessError::collaborator("student channel", e.to_string()))?;
        conversations.insert(
            conversation_id.clone(),
            (student_id.to_string(), topic_id.to_string()),
        );
        Ok(conversation_id)
    }

    async fn reply(&self, conversation_id: &str, message: &str) -> Result<String, AssessError> {
        let (student_id, topic_id) = self
            .conversations
            .lock()
            .map_err(|e| AssessError::collaborator("student channel", e.to_string()))?
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| {
                AssessError::collaborator(
                    "student channel",
                    format!("unknown conversation {conversation_id}"),
                )
            })?;

        self.replies.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .reply_failures
            .lock()
            .map_err(|e| AssessError::collaborator("student channel", e.to_string()))?
            .get_mut(&student_id)
            .filter(|left| **left > 0)
            .map(|left| *left -= 1)
            .is_some();
        if injected {
            return Err(AssessError::collaborator(
                "student channel",
                format!("interact failed for {student_id}"),
            ));
        }

        if let Some(delay) = self.reply_delays.get(&student_id) {
            tokio::time::sleep(*delay).await;
        }

        let level = self
            .true_level(&student_id, &topic_id)
            .unwrap_or(SkillLevel::AT_GRADE);
        Ok(match difficulty_tag(message) {
            Some(d) if d <= level => format!("correct: I can handle level {d}"),
            Some(d) => format!("incorrect: level {d} is beyond me"),
            None => "partial: I'm not sure what you mean".to_string(),
        })
    }
}

#[async_trait]
impl PredictionSink for InMemoryPlatform {
    async fn submit(&self, prediction: &Prediction) -> Result<(), AssessError> {
        let key = (prediction.student_id.clone(), prediction.topic_id.clone());
        if self.rejected_submissions.contains(&key) {
            return Err(AssessError::Submission {
                student_id: key.0,
                topic_id: key.1,
                message: "rejected by platform".to_string(),
            });
        }
        let mut submissions = self.submissions.lock().map_err(|e| AssessError::Submission {
            student_id: key.0.clone(),
            topic_id: key.1.clone(),
            message: e.to_string(),
        })?;
        submissions.insert(key, prediction.predicted_level);
        Ok(())
    }
}
