use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

/// One recorded session as the campus live-course listing reports it. The
/// `video` URL is the unauthenticated playback URL and may be empty while
/// the recording is still being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCourse {
    pub name: String,
    pub teacher: String,
    pub location: String,
    pub date: String,
    pub time: String,
    pub video: String,
}

/// Fetches the recorded-session metadata for a lecture the timetable knows
/// about.
#[async_trait]
pub trait LiveCourseSearch: Send + Sync {
    async fn search(&self, token: &str, sub_id: i64, course_id: i64)
    -> Result<Option<LiveCourse>>;
}

pub struct LiveCourseClient {
    client: reqwest::Client,
    search_url: String,
}

impl LiveCourseClient {
    pub fn new(search_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build live course client")?;
        Ok(Self {
            client,
            search_url: search_url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    list: Vec<SessionRow>,
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    realname: String,
    #[serde(default)]
    room_name: String,
    #[serde(default)]
    sub_title: String,
    course_begin: String,
    course_over: String,
    #[serde(default)]
    video_list: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    #[serde(default)]
    preview_url: String,
}

#[async_trait]
impl LiveCourseSearch for LiveCourseClient {
    async fn search(
        &self,
        token: &str,
        sub_id: i64,
        course_id: i64,
    ) -> Result<Option<LiveCourse>> {
        let url = format!(
            "{}?all=1&course_id={course_id}&sub_id={sub_id}",
            self.search_url
        );
        let envelope: SearchEnvelope = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .context("live course search request failed")?
            .error_for_status()
            .context("live course search request rejected")?
            .json()
            .await
            .context("malformed live course response")?;

        if envelope.code != 0 {
            bail!(
                "live course search failed with code {}: {}",
                envelope.code,
                envelope.msg
            );
        }
        let Some(row) = envelope.list.into_iter().next() else {
            return Ok(None);
        };

        let begin = row
            .course_begin
            .parse::<i64>()
            .context("live course entry has a non-numeric course_begin")?;
        let over = row
            .course_over
            .parse::<i64>()
            .context("live course entry has a non-numeric course_over")?;
        let video = row
            .video_list
            .first()
            .map(|entry| entry.preview_url.clone())
            .unwrap_or_default();

        Ok(Some(LiveCourse {
            name: row.title,
            teacher: row.realname,
            location: row.room_name,
            date: row.sub_title,
            time: format!("{}-{}", clock_time(begin), clock_time(over)),
            video,
        }))
    }
}

fn clock_time(unix_seconds: i64) -> String {
    Local
        .timestamp_opt(unix_seconds, 0)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_the_first_listing_row_to_a_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("all", "1"))
            .and(query_param("course_id", "3"))
            .and(query_param("sub_id", "7"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "list": [{
                    "id": 3,
                    "sub_id": 7,
                    "title": "Databases",
                    "realname": "Prof. Chen",
                    "room_name": "Hall B-204",
                    "sub_title": "2026-03-02",
                    "course_begin": "1700000000",
                    "course_over": "1700003600",
                    "video_list": [
                        {"preview_url": "https://video.host/lec/7.mp4"},
                        {"preview_url": "https://video.host/lec/7-cam2.mp4"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let client = LiveCourseClient::new(server.uri()).unwrap();
        let session = client
            .search("tok-1", 7, 3)
            .await
            .unwrap()
            .expect("listing should carry the session");

        assert_eq!(session.name, "Databases");
        assert_eq!(session.teacher, "Prof. Chen");
        assert_eq!(session.location, "Hall B-204");
        assert_eq!(session.date, "2026-03-02");
        assert_eq!(session.video, "https://video.host/lec/7.mp4");
        assert_eq!(
            session.time,
            format!("{}-{}", clock_time(1_700_000_000), clock_time(1_700_003_600))
        );
    }

    #[tokio::test]
    async fn missing_video_list_maps_to_an_empty_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "list": [{
                    "title": "Databases",
                    "course_begin": "1700000000",
                    "course_over": "1700003600"
                }]
            })))
            .mount(&server)
            .await;

        let client = LiveCourseClient::new(server.uri()).unwrap();
        let session = client.search("tok-1", 7, 3).await.unwrap().unwrap();
        assert!(session.video.is_empty());
    }

    #[tokio::test]
    async fn empty_listing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 0, "list": []})),
            )
            .mount(&server)
            .await;

        let client = LiveCourseClient::new(server.uri()).unwrap();
        assert!(client.search("tok-1", 7, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_zero_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 40001,
                "msg": "token expired"
            })))
            .mount(&server)
            .await;

        let client = LiveCourseClient::new(server.uri()).unwrap();
        let error = client.search("tok-1", 7, 3).await.unwrap_err();
        assert!(error.to_string().contains("40001"));
        assert!(error.to_string().contains("token expired"));
    }
}
