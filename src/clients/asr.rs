use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const STATUS_SUCCESS: i64 = 2;
const STATUS_FAILED: i64 = 3;

// Recognition results carry `[mm:ss.mmm,mm:ss.mmm,spk]` segment markers.
static SEGMENT_MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\d{1,3}:\d{1,2}\.\d{3},\d{1,3}:\d{1,2}\.\d{3},\d]\s*")
        .expect("segment markup pattern")
});

/// Turns an uploaded audio object into a plain-text transcript.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, audio_url: &str) -> Result<String>;
}

/// Asynchronous recognition API: create a task, poll until it reaches a
/// terminal status. Credentials are a pool of key pairs; each recognition
/// picks one at random to spread quota.
pub struct AsrClient {
    client: reqwest::Client,
    base_url: String,
    secret_ids: Vec<String>,
    secret_keys: Vec<String>,
    poll_interval: Duration,
}

impl AsrClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_ids: Vec<String>,
        secret_keys: Vec<String>,
        poll_interval: Duration,
    ) -> Result<Self> {
        if secret_ids.is_empty() || secret_ids.len() != secret_keys.len() {
            bail!("speech recognition credentials must be non-empty id/key pairs");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build speech recognition client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_ids,
            secret_keys,
            poll_interval,
        })
    }

    fn pick_credentials(&self) -> (&str, &str) {
        let idx = rand::rng().random_range(0..self.secret_ids.len());
        (&self.secret_ids[idx], &self.secret_keys[idx])
    }

    async fn create_task(&self, audio_url: &str, id: &str, key: &str) -> Result<i64> {
        let request = CreateTaskRequest {
            source_url: audio_url,
            engine_model_type: "16k_zh_dialect",
            channel_num: 1,
            speaker_diarization: 1,
            convert_num_mode: 3,
        };
        let response: CreateTaskResponse = self
            .client
            .post(format!("{}/recognition/tasks", self.base_url))
            .header("X-Secret-Id", id)
            .header("X-Secret-Key", key)
            .json(&request)
            .send()
            .await
            .context("recognition task creation failed")?
            .error_for_status()
            .context("recognition task creation rejected")?
            .json()
            .await
            .context("malformed recognition task response")?;
        Ok(response.task_id)
    }

    async fn fetch_status(&self, task_id: i64, id: &str, key: &str) -> Result<TaskStatus> {
        self.client
            .get(format!("{}/recognition/tasks/{task_id}", self.base_url))
            .header("X-Secret-Id", id)
            .header("X-Secret-Key", key)
            .send()
            .await
            .context("recognition status request failed")?
            .error_for_status()
            .context("recognition status request rejected")?
            .json()
            .await
            .context("malformed recognition status response")
    }
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    source_url: &'a str,
    engine_model_type: &'static str,
    channel_num: u8,
    speaker_diarization: u8,
    convert_num_mode: u8,
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    task_id: i64,
}

#[derive(Deserialize)]
struct TaskStatus {
    status: i64,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error_msg: String,
}

#[async_trait]
impl SpeechRecognizer for AsrClient {
    async fn recognize(&self, audio_url: &str) -> Result<String> {
        let (id, key) = self.pick_credentials();
        let task_id = self.create_task(audio_url, id, key).await?;
        info!(task_id, "recognition task created");

        loop {
            tokio::time::sleep(self.poll_interval).await;
            let status = self.fetch_status(task_id, id, key).await?;
            match status.status {
                STATUS_SUCCESS => {
                    debug!(task_id, "recognition task finished");
                    return Ok(strip_segment_markup(&status.result));
                }
                STATUS_FAILED => {
                    bail!("recognition task {task_id} failed: {}", status.error_msg);
                }
                other => {
                    debug!(task_id, status = other, "recognition task still running");
                }
            }
        }
    }
}

/// Removes timestamp/speaker segment markers, leaving plain prose.
#[must_use]
pub fn strip_segment_markup(raw: &str) -> String {
    SEGMENT_MARKUP_RE.replace_all(raw, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> AsrClient {
        AsrClient::new(
            base,
            vec!["id-a".to_string()],
            vec!["key-a".to_string()],
            Duration::from_millis(10),
        )
        .unwrap()
    }

    #[test]
    fn markup_is_stripped_from_transcript() {
        let raw = "[0:0.000,0:6.580,0] 今天我们讲操作系统。\n[0:6.580,0:12.040,0] 首先是进程。";
        assert_eq!(
            strip_segment_markup(raw),
            "今天我们讲操作系统。\n首先是进程。"
        );
    }

    #[test]
    fn mismatched_credential_pairs_are_rejected() {
        let result = AsrClient::new(
            "http://localhost",
            vec!["id-a".to_string()],
            vec![],
            Duration::from_secs(20),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn polls_until_terminal_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recognition/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": 99})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/recognition/tasks/99"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 2,
                "result": "[0:0.000,0:3.000,1] hello"
            })))
            .mount(&server)
            .await;

        let transcript = client(&server.uri()).recognize("http://bucket/a.aac").await.unwrap();
        assert_eq!(transcript, "hello");
    }

    #[tokio::test]
    async fn failed_task_surfaces_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recognition/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": 7})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/recognition/tasks/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 3,
                "error_msg": "audio unreadable"
            })))
            .mount(&server)
            .await;

        let error = client(&server.uri())
            .recognize("http://bucket/a.aac")
            .await
            .unwrap_err();
        assert!(error.to_string().contains("audio unreadable"));
    }
}
