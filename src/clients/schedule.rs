use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

/// Where a lecture sits in the timetable: the session (`sub_id`) and the
/// parent course (`course_id`) every other campus API keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCourse {
    pub sub_id: i64,
    pub course_id: i64,
}

/// Looks a lecture up in one day's timetable by course title.
#[async_trait]
pub trait Timetable: Send + Sync {
    async fn find_course(
        &self,
        token: &str,
        date: &str,
        course_name: &str,
    ) -> Result<Option<ScheduledCourse>>;
}

pub struct ScheduleClient {
    client: reqwest::Client,
    schedule_url: String,
}

impl ScheduleClient {
    pub fn new(schedule_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build schedule client")?;
        Ok(Self {
            client,
            schedule_url: schedule_url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleEnvelope {
    #[serde(default)]
    result: ScheduleResult,
}

#[derive(Debug, Default, Deserialize)]
struct ScheduleResult {
    #[serde(default)]
    list: Vec<ScheduleDay>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDay {
    #[serde(default)]
    course: Vec<ScheduleSlot>,
}

#[derive(Debug, Deserialize)]
struct ScheduleSlot {
    id: String,
    course_id: String,
    course_title: String,
}

#[async_trait]
impl Timetable for ScheduleClient {
    /// Searches the week-schedule listing for the requested date; a title
    /// that matches zero or several slots counts as not found.
    async fn find_course(
        &self,
        token: &str,
        date: &str,
        course_name: &str,
    ) -> Result<Option<ScheduledCourse>> {
        let url = format!(
            "{}?start_at={date}&end_at={date}&token={token}",
            self.schedule_url
        );
        let envelope: ScheduleEnvelope = self
            .client
            .get(&url)
            .send()
            .await
            .context("schedule request failed")?
            .error_for_status()
            .context("schedule request rejected")?
            .json()
            .await
            .context("malformed schedule response")?;

        let hits: Vec<&ScheduleSlot> = envelope
            .result
            .list
            .iter()
            .flat_map(|day| day.course.iter())
            .filter(|slot| slot.course_title == course_name)
            .collect();
        let [slot] = hits.as_slice() else {
            if hits.len() > 1 {
                warn!(
                    course_name,
                    hits = hits.len(),
                    "course title is ambiguous in the schedule"
                );
            }
            return Ok(None);
        };

        let sub_id = slot
            .id
            .parse::<i64>()
            .context("schedule entry has a non-numeric id")?;
        let course_id = slot
            .course_id
            .parse::<i64>()
            .context("schedule entry has a non-numeric course_id")?;
        Ok(Some(ScheduledCourse { sub_id, course_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schedule_body() -> serde_json::Value {
        json!({
            "success": true,
            "result": {
                "code": 0,
                "msg": "ok",
                "list": [{
                    "day": "2026-03-02",
                    "course": [
                        {"id": "7", "course_id": "3", "course_title": "Databases"},
                        {"id": "8", "course_id": "4", "course_title": "Compilers"}
                    ]
                }]
            }
        })
    }

    #[tokio::test]
    async fn finds_the_single_slot_matching_the_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("start_at", "2026-03-02"))
            .and(query_param("end_at", "2026-03-02"))
            .and(query_param("token", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schedule_body()))
            .mount(&server)
            .await;

        let client = ScheduleClient::new(server.uri()).unwrap();
        let slot = client
            .find_course("tok-1", "2026-03-02", "Databases")
            .await
            .unwrap()
            .expect("course should be on the schedule");

        assert_eq!(
            slot,
            ScheduledCourse {
                sub_id: 7,
                course_id: 3
            }
        );
    }

    #[tokio::test]
    async fn unknown_title_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schedule_body()))
            .mount(&server)
            .await;

        let client = ScheduleClient::new(server.uri()).unwrap();
        let slot = client
            .find_course("tok-1", "2026-03-02", "Astronomy")
            .await
            .unwrap();
        assert!(slot.is_none());
    }

    #[tokio::test]
    async fn ambiguous_title_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "list": [{
                        "day": "2026-03-02",
                        "course": [
                            {"id": "7", "course_id": "3", "course_title": "Databases"},
                            {"id": "9", "course_id": "3", "course_title": "Databases"}
                        ]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = ScheduleClient::new(server.uri()).unwrap();
        let slot = client
            .find_course("tok-1", "2026-03-02", "Databases")
            .await
            .unwrap();
        assert!(slot.is_none());
    }
}
