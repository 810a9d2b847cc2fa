use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::assets::render_course_summary_prompt;
use crate::clients::{
    LanguageModel, ObjectStorage, SpeechRecognizer, Transcoder, UserDirectory, UserInfo,
    VideoAuthority,
};
use crate::config::Config;
use crate::queue::{Job, JobRegistry};
use crate::store::{
    CourseStore, SUMMARY_STATUS_EMPTY, SUMMARY_STATUS_GENERATING, SummaryStore,
};

use super::locks::SubjectLocks;
use super::signature::{url_path_of, video_auth_query};

pub const SUMMARY_JOB_TYPE: &str = "summary";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryTask {
    #[default]
    New,
    Regenerate,
}

impl SummaryTask {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryTask::New => "new",
            SummaryTask::Regenerate => "regenerate",
        }
    }
}

/// Everything a summary job needs to resume after a restart. The id is
/// generated once and stored so a replayed job keeps its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub job_id: String,
    pub token: String,
    pub sub_id: i64,
    pub task: SummaryTask,
    pub course_id: i64,
    pub course_name: String,
    pub video_url: String,
    #[serde(default)]
    pub asr: String,
}

/// Live dependency bundle re-injected into jobs at construction and
/// recovery time. Everything is an `Arc` so clones are cheap.
#[derive(Clone)]
pub struct SummaryDeps {
    pub config: Arc<Config>,
    pub courses: Arc<dyn CourseStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub users: Arc<dyn UserDirectory>,
    pub video_auth: Arc<dyn VideoAuthority>,
    pub transcoder: Arc<dyn Transcoder>,
    pub storage: Arc<dyn ObjectStorage>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub llm: Arc<dyn LanguageModel>,
    pub locks: Arc<SubjectLocks>,
}

/// One lecture-summary pipeline run: optional transcode/upload/ASR leg,
/// then an LLM pass over the transcript.
///
/// The course row's `summary_status` moves empty -> `generating` ->
/// `finished`; every failure after `generating` was written rolls it back
/// to empty so a lecture is never stuck mid-state.
pub struct SummaryJob {
    payload: SummaryPayload,
    deps: SummaryDeps,
}

impl SummaryJob {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        token: String,
        sub_id: i64,
        task: SummaryTask,
        course_id: i64,
        course_name: String,
        video_url: String,
        asr: String,
        deps: SummaryDeps,
    ) -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let payload = SummaryPayload {
            job_id: format!("summary-{sub_id}-{nanos}"),
            token,
            sub_id,
            task,
            course_id,
            course_name,
            video_url,
            asr,
        };
        Self { payload, deps }
    }

    #[must_use]
    pub fn from_payload(payload: SummaryPayload, deps: SummaryDeps) -> Self {
        Self { payload, deps }
    }

    /// Registers the loader that rebuilds persisted summary jobs during
    /// queue recovery.
    pub fn register(registry: &mut JobRegistry, deps: SummaryDeps) {
        registry.register(SUMMARY_JOB_TYPE, move |data| {
            let payload: SummaryPayload =
                serde_json::from_value(data).context("malformed summary job payload")?;
            Ok(Box::new(SummaryJob::from_payload(payload, deps.clone())) as Box<dyn Job>)
        });
    }

    fn needs_transcription(&self) -> bool {
        self.payload.task == SummaryTask::New && self.payload.asr.is_empty()
    }

    /// Best-effort compensation: put the course back to "no summary" so
    /// the frontend can re-trigger. Rollback failures are logged, never
    /// escalated over the original error.
    async fn rollback_status(&self) {
        if let Err(error) = self
            .deps
            .courses
            .update_summary_status(self.payload.sub_id, SUMMARY_STATUS_EMPTY)
            .await
        {
            warn!(
                job_id = %self.payload.job_id,
                sub_id = self.payload.sub_id,
                error = %format!("{error:#}"),
                "failed to roll back summary status"
            );
        }
    }

    async fn abort<T>(&self, error: anyhow::Error) -> Result<T> {
        self.rollback_status().await;
        Err(error)
    }

    async fn run(&self) -> Result<()> {
        let payload = &self.payload;
        info!(
            job_id = %payload.job_id,
            sub_id = payload.sub_id,
            task = payload.task.as_str(),
            "starting summary job"
        );

        // Before any status write: a failure here leaves the course row
        // untouched.
        let user = self
            .deps
            .users
            .user_info(&payload.token)
            .await
            .context("failed to fetch user info")?;

        let transcript = if self.needs_transcription() {
            self.transcribe(&user).await?
        } else if payload.task == SummaryTask::Regenerate {
            self.load_stored_transcript(&user).await?
        } else {
            if payload.asr.is_empty() {
                bail!("summary job carries neither a transcript nor a transcription request");
            }
            payload.asr.clone()
        };

        self.summarize(&user, &transcript).await?;

        info!(job_id = %payload.job_id, sub_id = payload.sub_id, "summary job finished");
        Ok(())
    }

    /// The transcription leg: signed URL, optional transcode, upload, ASR,
    /// transcript persistence, artifact cleanup. Sets `generating` up
    /// front; every later failure rolls it back.
    async fn transcribe(&self, user: &UserInfo) -> Result<String> {
        let payload = &self.payload;
        let config = &self.deps.config;

        self.deps
            .courses
            .update_summary_status(payload.sub_id, SUMMARY_STATUS_GENERATING)
            .await
            .context("failed to mark summary as generating")?;

        let auth_key = match self
            .deps
            .video_auth
            .auth_key(&payload.token, payload.course_id, payload.sub_id)
            .await
        {
            Ok(key) => key,
            Err(error) => return self.abort(error.context("failed to fetch video auth key")).await,
        };

        let url_path = match url_path_of(&payload.video_url) {
            Ok(path) => path,
            Err(error) => return self.abort(error).await,
        };
        let timestamp = Utc::now().timestamp();
        let query = video_auth_query(
            &auth_key,
            &url_path,
            user.id,
            user.tenant_id,
            &user.phone,
            timestamp,
        );
        let authorized_url = format!("{}?{query}", payload.video_url);

        let course = match self.deps.courses.find(payload.sub_id).await {
            Ok(Some(course)) => course,
            Ok(None) => {
                return self
                    .abort(anyhow!("course {} not found", payload.sub_id))
                    .await;
            }
            Err(error) => return self.abort(error.context("failed to load course")).await,
        };

        let mut audio_id = course.audio_id;
        if audio_id.is_empty() {
            audio_id = format!("{}-{timestamp}", payload.sub_id);
            if let Err(error) = tokio::fs::create_dir_all(config.scratch_dir()).await {
                return self
                    .abort(anyhow::Error::new(error).context("failed to create scratch dir"))
                    .await;
            }
            let audio_path = config.scratch_dir().join(format!("{audio_id}.aac"));
            if let Err(error) = self
                .deps
                .transcoder
                .video_to_audio(&authorized_url, &audio_path, config.transcode_timeout())
                .await
            {
                return self.abort(error.context("audio extraction failed")).await;
            }
            // Best effort: a lost audio id only costs a re-transcode later.
            if let Err(error) = self
                .deps
                .courses
                .update_audio_id(payload.sub_id, &audio_id)
                .await
            {
                warn!(
                    job_id = %payload.job_id,
                    sub_id = payload.sub_id,
                    error = %format!("{error:#}"),
                    "failed to persist audio id"
                );
            }
        }

        let file_name = format!("{audio_id}.aac");
        let audio_path = config.scratch_dir().join(&file_name);

        if let Err(error) = self.deps.storage.upload(&audio_path, &file_name).await {
            return self.abort(error.context("audio upload failed")).await;
        }

        let audio_url = self.deps.storage.object_url(&file_name);
        let transcript = match self.deps.recognizer.recognize(&audio_url).await {
            Ok(transcript) => transcript,
            Err(error) => return self.abort(error.context("speech recognition failed")).await,
        };

        if let Err(error) = self
            .deps
            .courses
            .update_asr(payload.sub_id, &transcript)
            .await
        {
            return self.abort(error.context("failed to store transcript")).await;
        }

        // Cleanup is best effort; leftover artifacts cost storage, not
        // correctness.
        info!(job_id = %payload.job_id, file = %file_name, "cleaning up audio artifacts");
        if let Err(error) = self.deps.storage.delete(&file_name).await {
            warn!(
                job_id = %payload.job_id,
                file = %file_name,
                error = %format!("{error:#}"),
                "failed to delete uploaded audio object"
            );
        }
        if let Err(error) = tokio::fs::remove_file(&audio_path).await {
            warn!(
                job_id = %payload.job_id,
                file = %audio_path.display(),
                error = %error,
                "failed to remove local audio file"
            );
        }

        Ok(transcript)
    }

    /// Regeneration reads the transcript stored by an earlier run and
    /// opens a fresh summary row for this user. Never touches
    /// `summary_status`; that belongs to the course-level flow.
    async fn load_stored_transcript(&self, user: &UserInfo) -> Result<String> {
        let payload = &self.payload;
        self.deps
            .summaries
            .init_new_summary(payload.sub_id, &user.account)
            .await
            .context("failed to open a new summary row")?;

        let course = self
            .deps
            .courses
            .find(payload.sub_id)
            .await
            .context("failed to load course")?
            .ok_or_else(|| anyhow!("course {} not found", payload.sub_id))?;

        if course.asr.is_empty() {
            bail!(
                "course {} has no stored transcript to regenerate from",
                payload.sub_id
            );
        }
        Ok(course.asr)
    }

    /// Common tail: prompt render, LLM call, result persistence. When the
    /// transcription leg set `generating`, a failure here still rolls the
    /// status back.
    async fn summarize(&self, user: &UserInfo, transcript: &str) -> Result<()> {
        let payload = &self.payload;
        let status_set = self.needs_transcription();
        let prompt = render_course_summary_prompt(&payload.course_name);

        let completion = match self.deps.llm.complete(&prompt, transcript).await {
            Ok(completion) => completion,
            Err(error) => {
                let error = error.context("summary generation failed");
                if status_set {
                    return self.abort(error).await;
                }
                return Err(error);
            }
        };

        let model = self.deps.llm.model().to_string();
        let result = match payload.task {
            SummaryTask::New => self
                .deps
                .courses
                .update_summary(
                    payload.sub_id,
                    &completion.text,
                    &model,
                    completion.total_tokens,
                    &user.account,
                )
                .await
                .context("failed to store finished summary"),
            SummaryTask::Regenerate => self.update_newest_summary_row(user, &completion, &model).await,
        };

        if let Err(error) = result {
            if status_set {
                return self.abort(error).await;
            }
            return Err(error);
        }
        Ok(())
    }

    async fn update_newest_summary_row(
        &self,
        user: &UserInfo,
        completion: &crate::clients::Completion,
        model: &str,
    ) -> Result<()> {
        let payload = &self.payload;
        let rows = self
            .deps
            .summaries
            .find_by_sub_id_and_user(payload.sub_id, &user.account)
            .await
            .context("failed to list summary rows")?;
        let newest = rows
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no summary row to update for course {}", payload.sub_id))?;

        let mut updated = newest;
        updated.summary = completion.text.clone();
        updated.model = model.to_string();
        updated.token = completion.total_tokens;
        self.deps
            .summaries
            .update(&updated)
            .await
            .context("failed to update summary row")
    }
}

#[async_trait]
impl Job for SummaryJob {
    fn id(&self) -> &str {
        &self.payload.job_id
    }

    fn job_type(&self) -> &'static str {
        SUMMARY_JOB_TYPE
    }

    fn payload(&self) -> Result<Value> {
        serde_json::to_value(&self.payload).context("failed to serialise summary payload")
    }

    async fn execute(&self) -> Result<()> {
        let _guard = self.deps.locks.acquire(self.payload.sub_id).await;

        match timeout(self.deps.config.job_timeout(), self.run()).await {
            Ok(result) => result,
            Err(_) => {
                if self.needs_transcription() {
                    self.rollback_status().await;
                }
                Err(anyhow!(
                    "summary job timed out after {:?}",
                    self.deps.config.job_timeout()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_embeds_subject_and_is_sortable() {
        let first = format!("summary-7-{}", 1_000_000_i64);
        let second = format!("summary-7-{}", 2_000_000_i64);
        assert!(first < second);
        assert!(first.starts_with("summary-7-"));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = SummaryPayload {
            job_id: "summary-7-123".to_string(),
            token: "tok".to_string(),
            sub_id: 7,
            task: SummaryTask::Regenerate,
            course_id: 3,
            course_name: "Databases".to_string(),
            video_url: "https://host/v.mp4".to_string(),
            asr: String::new(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["task"], "regenerate");
        let back: SummaryPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.job_id, "summary-7-123");
        assert_eq!(back.task, SummaryTask::Regenerate);
    }
}
