//! 学生平台 HTTP 客户端
//!
//! - GET  /students?set_type=...        学生列表
//! - GET  /students/{id}/topics         学生的主题
//! - POST /interact/start               开启对话
//! - POST /interact                     发送题目、取回作答
//! - POST /evaluate/mse                 提交预测
//!
//! 写操作带 X-Api-Key。list_students 拉到的学生记录会缓存下来，作为 fetch_profile 的画像。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::assessment::Topic;
use crate::config::{Dataset, PlatformSection};
use crate::core::AssessError;
use crate::platform::{Prediction, PredictionSink, StudentChannel, StudentDirectory, StudentInfo};

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
struct StudentsResponse {
    students: Vec<StudentInfo>,
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct InteractResponse {
    student_response: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    mse_score: Option<f64>,
}

pub struct PlatformClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    set_type: String,
    students: RwLock<HashMap<String, StudentInfo>>,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            set_type: Dataset::default().set_type().to_string(),
            students: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PlatformSection, dataset: &Dataset) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .with_dataset(dataset)
    }

    /// 提交预测时附带的 set_type
    pub fn with_dataset(mut self, dataset: &Dataset) -> Self {
        self.set_type = dataset.set_type().to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AssessError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AssessError::collaborator("student platform", e.to_string()))?;
        response
            .json::<T>()
            .await
            .map_err(|e| AssessError::collaborator("student platform", format!("bad response body: {e}")))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, reqwest::Error> {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        request.send().await?.error_for_status()?.json::<T>().await
    }
}

#[async_trait]
impl StudentDirectory for PlatformClient {
    async fn list_students(&self, dataset: &Dataset) -> Result<Vec<StudentInfo>, AssessError> {
        let response: StudentsResponse = self
            .get_json("/students", &[("set_type", dataset.set_type())])
            .await?;
        let mut cache = self.students.write().await;
        for student in &response.students {
            cache.insert(student.id.clone(), student.clone());
        }
        Ok(response.students)
    }

    async fn list_topics(&self, student_id: &str) -> Result<Vec<Topic>, AssessError> {
        let response: TopicsResponse = self
            .get_json(&format!("/students/{student_id}/topics"), &[])
            .await?;
        Ok(response.topics)
    }

    async fn fetch_profile(&self, student_id: &str) -> Result<serde_json::Value, AssessError> {
        let cache = self.students.read().await;
        let profile = match cache.get(student_id) {
            Some(student) => serde_json::to_value(student)
                .map_err(|e| AssessError::collaborator("student platform", e.to_string()))?,
            None => json!({ "id": student_id }),
        };
        Ok(profile)
    }
}

#[async_trait]
impl StudentChannel for PlatformClient {
    async fn start(&self, student_id: &str, topic_id: &str) -> Result<String, AssessError> {
        let response: StartResponse = self
            .post_json(
                "/interact/start",
                json!({ "student_id": student_id, "topic_id": topic_id }),
            )
            .await
            .map_err(|e| AssessError::collaborator("student channel", e.to_string()))?;
        Ok(response.conversation_id)
    }

    async fn reply(&self, conversation_id: &str, message: &str) -> Result<String, AssessError> {
        let response: InteractResponse = self
            .post_json(
                "/interact",
                json!({ "conversation_id": conversation_id, "tutor_message": message }),
            )
            .await
            .map_err(|e| AssessError::collaborator("student channel", e.to_string()))?;
        Ok(response.student_response)
    }
}

#[async_trait]
impl PredictionSink for PlatformClient {
    async fn submit(&self, prediction: &Prediction) -> Result<(), AssessError> {
        let body = json!({
            "predictions": [prediction],
            "set_type": self.set_type,
        });
        let response: SubmitResponse = self
            .post_json("/evaluate/mse", body)
            .await
            .map_err(|e| AssessError::Submission {
                student_id: prediction.student_id.clone(),
                topic_id: prediction.topic_id.clone(),
                message: e.to_string(),
            })?;
        if let Some(mse) = response.mse_score {
            tracing::debug!(
                "submitted {}/{}: running MSE {:.4}",
                prediction.student_id,
                prediction.topic_id,
                mse
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use crate::assessment::SkillLevel;

    /// 假平台收到的写请求：(路径, X-Api-Key, body)
    type Calls = Arc<Mutex<Vec<(String, Option<String>, serde_json::Value)>>>;

    fn record(calls: &Calls, path: &str, headers: &HeaderMap, body: &serde_json::Value) {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        calls.lock().unwrap().push((path.to_string(), key, body.clone()));
    }

    async fn students(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        let set_type = q.get("set_type").cloned().unwrap_or_default();
        Json(json!({
            "students": [{ "id": format!("{set_type}-1"), "name": "Ada", "grade_level": 8 }]
        }))
    }

    async fn topics(Path(id): Path<String>) -> Json<serde_json::Value> {
        Json(json!({
            "topics": [{
                "id": format!("{id}-fractions"),
                "name": "Fractions",
                "subject_name": "Math",
                "grade_level": 8
            }]
        }))
    }

    async fn start(
        State(calls): State<Calls>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        record(&calls, "/interact/start", &headers, &body);
        Json(json!({ "conversation_id": "conv-1" }))
    }

    async fn interact(
        State(calls): State<Calls>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        record(&calls, "/interact", &headers, &body);
        let message = body["tutor_message"].as_str().unwrap_or_default();
        Json(json!({ "student_response": format!("answer to: {message}") }))
    }

    async fn evaluate(
        State(calls): State<Calls>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        record(&calls, "/evaluate/mse", &headers, &body);
        if body["predictions"][0]["student_id"] == "blocked" {
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        Ok(Json(json!({ "mse_score": 0.25 })))
    }

    /// 在随机端口起一个假平台，返回 base_url 与请求记录
    async fn fake_platform() -> (String, Calls) {
        let calls: Calls = Arc::default();
        let app = Router::new()
            .route("/students", get(students))
            .route("/students/:id/topics", get(topics))
            .route("/interact/start", post(start))
            .route("/interact", post(interact))
            .route("/evaluate/mse", post(evaluate))
            .with_state(calls.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), calls)
    }

    fn client(base_url: &str) -> PlatformClient {
        PlatformClient::new(base_url, Some("secret".into()), Duration::from_secs(5))
            .with_dataset(&Dataset::Dev)
    }

    #[tokio::test]
    async fn test_directory_endpoints() {
        let (base_url, _) = fake_platform().await;
        let client = client(&base_url);

        let students = client.list_students(&Dataset::Dev).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "dev-1");

        let topics = client.list_topics("dev-1").await.unwrap();
        assert_eq!(topics[0].id, "dev-1-fractions");
        assert_eq!(topics[0].subject_name, "Math");

        // list_students 之后画像来自缓存的学生记录
        let profile = client.fetch_profile("dev-1").await.unwrap();
        assert_eq!(profile["name"], "Ada");
        assert_eq!(profile["grade_level"], 8);
    }

    #[tokio::test]
    async fn test_channel_endpoints_send_api_key() {
        let (base_url, calls) = fake_platform().await;
        let client = client(&base_url);

        let conversation = client.start("s1", "t1").await.unwrap();
        assert_eq!(conversation, "conv-1");
        let reply = client.reply(&conversation, "What is 1/2 + 1/4?").await.unwrap();
        assert_eq!(reply, "answer to: What is 1/2 + 1/4?");

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "/interact/start");
        assert_eq!(calls[0].1.as_deref(), Some("secret"));
        assert_eq!(calls[0].2["student_id"], "s1");
        assert_eq!(calls[0].2["topic_id"], "t1");
        assert_eq!(calls[1].2["conversation_id"], "conv-1");
    }

    #[tokio::test]
    async fn test_submit_posts_prediction_with_set_type() {
        let (base_url, calls) = fake_platform().await;
        let client = client(&base_url);

        let prediction = Prediction {
            student_id: "s1".into(),
            topic_id: "t1".into(),
            predicted_level: SkillLevel::ABOVE_GRADE,
        };
        client.submit(&prediction).await.unwrap();

        let blocked = Prediction {
            student_id: "blocked".into(),
            ..prediction
        };
        let err = client.submit(&blocked).await.unwrap_err();
        assert!(matches!(err, AssessError::Submission { ref student_id, .. } if student_id == "blocked"));

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "/evaluate/mse");
        assert_eq!(calls[0].2["set_type"], "dev");
        assert_eq!(calls[0].2["predictions"][0]["predicted_level"], 4);
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_collaborator_error() {
        let client = client("http://127.0.0.1:9");
        let err = client.list_students(&Dataset::Dev).await.unwrap_err();
        assert!(matches!(err, AssessError::Collaborator { .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = PlatformClient::new("http://example.test/", None, Duration::from_secs(1));
        assert_eq!(client.url("/students"), "http://example.test/students");
    }

    #[tokio::test]
    async fn test_profile_falls_back_to_id() {
        let client = PlatformClient::new("http://example.test", None, Duration::from_secs(1));
        let profile = client.fetch_profile("s-42").await.unwrap();
        assert_eq!(profile["id"], "s-42");
    }

    #[test]
    fn test_prediction_wire_shape() {
        let prediction = Prediction {
            student_id: "s".into(),
            topic_id: "t".into(),
            predicted_level: crate::assessment::SkillLevel::ABOVE_GRADE,
        };
        let value = serde_json::to_value(&prediction).unwrap();
        assert_eq!(value["predicted_level"], 4);
    }
}
