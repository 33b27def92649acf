//! 基于 LLM 的判定提供方
//!
//! 三种模式各自一段 system prompt，要求模型只输出一个 JSON 对象；
//! parse_* 从回复中抽取 JSON（```json 块或裸对象）并校验字段，缺字段或越界即 MalformedJudgment。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::assessment::{Correctness, HolisticReview, Judgment, QaPair, SkillLevel, Topic};
use crate::core::AssessError;
use crate::judge::{JudgmentProvider, QuestionRequest};
use crate::llm::{LlmClient, Message};

const QUESTION_SYSTEM_PROMPT: &str = "You are an expert educational question writer assessing a student's skill level. \
Write exactly one question about the given topic, pitched at the requested difficulty on a 1-5 scale \
(1 = basic recall, 3 = grade-level application, 5 = advanced mastery). \
Do not repeat earlier questions. \
Reply with a single JSON object: {\"question\": \"...\"}";

const JUDGE_SYSTEM_PROMPT: &str = "You are an educational assessment expert grading one student answer. \
Decide whether the answer is correct, partial or incorrect for the question's difficulty. \
Reply with a single JSON object: \
{\"correctness\": \"correct|partial|incorrect\", \"credit\": <0..1, optional>, \"confidence\": <0..1>}";

const REVIEW_SYSTEM_PROMPT: &str = "You are an expert educational assessor. \
Given a full question/answer session, rate the student's overall understanding on a 1-5 scale: \
1 Struggling, 2 Below-grade, 3 At-grade, 4 Above-grade, 5 Advanced. \
Weigh question difficulty and look for patterns across all answers, not single responses. \
Reply with a single JSON object: {\"level\": <1..5>, \"confidence\": <0..1>}";

/// 从 LLM 输出中提取 JSON 片段（```json 块优先，其次首个 '{' 到最后一个 '}'）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

#[derive(Debug, Deserialize)]
struct QuestionReply {
    question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JudgmentReply {
    correctness: Option<String>,
    credit: Option<f64>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReviewReply {
    level: Option<serde_json::Value>,
    confidence: Option<f64>,
}

/// 出题回复：JSON 里的 question；没有 JSON 或花括号不是 JSON（如集合 {1,2,3}）时取整段文本
pub fn parse_question(output: &str) -> Result<String, AssessError> {
    let parsed = extract_json(output)
        .and_then(|json| serde_json::from_str::<QuestionReply>(json).ok());
    let question = match parsed {
        Some(reply) => reply.question.unwrap_or_default(),
        None => output.to_string(),
    };
    let question = question.trim();
    if question.is_empty() {
        return Err(AssessError::MalformedJudgment("empty question".into()));
    }
    Ok(question.to_string())
}

pub fn parse_judgment(output: &str) -> Result<Judgment, AssessError> {
    let json = extract_json(output)
        .ok_or_else(|| AssessError::MalformedJudgment(format!("no JSON in judgment: {output}")))?;
    let reply: JudgmentReply = serde_json::from_str(json)
        .map_err(|e| AssessError::MalformedJudgment(format!("{}: {}", e, json)))?;

    let correctness = match reply
        .correctness
        .as_deref()
        .map(|c| c.trim().to_lowercase())
        .as_deref()
    {
        Some("correct") => Correctness::Correct,
        Some("partial") | Some("partially correct") => Correctness::Partial,
        Some("incorrect") | Some("wrong") => Correctness::Incorrect,
        Some(other) => {
            return Err(AssessError::MalformedJudgment(format!(
                "unknown correctness '{other}'"
            )))
        }
        None => return Err(AssessError::MalformedJudgment("missing correctness".into())),
    };
    let confidence = reply
        .confidence
        .ok_or_else(|| AssessError::MalformedJudgment("missing confidence".into()))?;

    Judgment {
        correctness,
        credit: reply.credit.unwrap_or_else(|| correctness.default_credit()),
        confidence,
    }
    .validated()
}

pub fn parse_review(output: &str) -> Result<HolisticReview, AssessError> {
    let json = extract_json(output)
        .ok_or_else(|| AssessError::MalformedJudgment(format!("no JSON in review: {output}")))?;
    let reply: ReviewReply = serde_json::from_str(json)
        .map_err(|e| AssessError::MalformedJudgment(format!("{}: {}", e, json)))?;

    let level = match reply.level {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .and_then(SkillLevel::new),
        Some(serde_json::Value::String(label)) => level_from_label(&label),
        _ => None,
    }
    .ok_or_else(|| AssessError::MalformedJudgment(format!("missing or invalid level: {json}")))?;

    let confidence = reply
        .confidence
        .ok_or_else(|| AssessError::MalformedJudgment("missing review confidence".into()))?;
    HolisticReview::new(level, confidence)
}

/// "3" / "At-grade" / "advanced" 等写法
fn level_from_label(label: &str) -> Option<SkillLevel> {
    let norm = label.trim().to_lowercase().replace([' ', '_'], "-");
    if let Ok(n) = norm.parse::<u8>() {
        return SkillLevel::new(n);
    }
    match norm.as_str() {
        "struggling" => Some(SkillLevel::STRUGGLING),
        "below-grade" => Some(SkillLevel::BELOW_GRADE),
        "at-grade" => Some(SkillLevel::AT_GRADE),
        "above-grade" => Some(SkillLevel::ABOVE_GRADE),
        "advanced" => Some(SkillLevel::ADVANCED),
        _ => None,
    }
}

fn topic_header(topic: &Topic) -> String {
    let mut parts = vec![format!("Topic: {}", topic.name)];
    if !topic.subject_name.is_empty() {
        parts.push(format!("Subject: {}", topic.subject_name));
    }
    if topic.grade_level > 0 {
        parts.push(format!("Grade Level: {}", topic.grade_level));
    }
    parts.join("\n")
}

fn render_transcript(transcript: &[QaPair]) -> String {
    transcript
        .iter()
        .map(|qa| {
            format!(
                "--- Turn {} (difficulty {}/5) ---\nQuestion: {}\nStudent Response: {}\nGraded: {:?}",
                qa.turn, qa.difficulty, qa.question, qa.response, qa.judgment.correctness
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// LLM 判定：持有任意 LlmClient
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn ask(&self, system: &str, prompt: String, collaborator: &'static str) -> Result<String, AssessError> {
        let messages = vec![Message::system(system), Message::user(prompt)];
        self.llm
            .complete(&messages)
            .await
            .map_err(|e| AssessError::collaborator(collaborator, e))
    }
}

#[async_trait]
impl JudgmentProvider for LlmJudge {
    async fn ask_question(&self, request: QuestionRequest<'_>) -> Result<String, AssessError> {
        let mut prompt = vec![
            topic_header(request.topic),
            format!("Target difficulty: {}/5 ({})", request.difficulty, request.difficulty.label()),
        ];
        if !request.profile.is_null() {
            prompt.push(format!("Student profile: {}", request.profile));
        }
        if !request.history.is_empty() {
            prompt.push("\nPrevious turns:".to_string());
            prompt.push(render_transcript(request.history));
        }
        prompt.push("\nWrite the next question.".to_string());

        let output = self
            .ask(QUESTION_SYSTEM_PROMPT, prompt.join("\n"), "question generator")
            .await?;
        parse_question(&output)
    }

    async fn judge_response(
        &self,
        topic: &Topic,
        question: &str,
        difficulty: SkillLevel,
        response: &str,
    ) -> Result<Judgment, AssessError> {
        let prompt = format!(
            "{}\nQuestion Difficulty: {}/5\nQuestion: {}\nStudent's Response: {}\n\nGrade the response.",
            topic_header(topic),
            difficulty,
            question,
            response
        );
        let output = self.ask(JUDGE_SYSTEM_PROMPT, prompt, "response judge").await?;
        parse_judgment(&output)
    }

    async fn review_transcript(
        &self,
        topic: &Topic,
        transcript: &[QaPair],
    ) -> Result<HolisticReview, AssessError> {
        let prompt = format!(
            "{}\n\nEvaluate the student's understanding based on the following Q&A session:\n{}\n\nAssess the overall level.",
            topic_header(topic),
            render_transcript(transcript)
        );
        let output = self.ask(REVIEW_SYSTEM_PROMPT, prompt, "transcript reviewer").await?;
        parse_review(&output)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}
