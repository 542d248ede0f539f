//! Operations exposed to callers. Every operation answers with an
//! [`Envelope`]; errors are reported in-band, never raised.

use std::{sync::Arc, time::Instant};

use futures::{StreamExt, stream::{self, BoxStream}};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    assembly::{self, ProgressReport},
    config::Config,
    decimal::stringify_numbers,
    error::{LecternError, Result},
    orchestrator::{Orchestrator, StreamEvent, lecture_tasks},
    pipeline::{ArtifactPipeline, chapters_from_json},
    provider::{ProviderKind, ProviderRegistry},
    repair::{ChatReformatter, Reformatter},
    schema::ArtifactKind,
    session::{Course, StudentRecord, VideoSession, student_key, video_key},
    store::{self, DocumentStore},
    types::WrongAnswer,
};

/// Tagged response: `{status: "success", provider, type, duration, data}` or
/// `{status: "error", type, code, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderKind>,
        #[serde(rename = "type")]
        kind: String,
        /// Seconds.
        duration: f64,
        data: Value,
    },
    Error {
        #[serde(rename = "type")]
        kind: String,
        code: String,
        message: String,
    },
}

impl Envelope {
    fn from_result(
        kind: &str,
        provider: Option<ProviderKind>,
        started: Instant,
        result: Result<Value>,
    ) -> Self {
        match result {
            Ok(data) => Envelope::Success {
                provider,
                kind: kind.to_string(),
                duration: started.elapsed().as_secs_f64(),
                data,
            },
            Err(e) => {
                warn!(operation = kind, code = e.code(), error = %e, "Request failed");
                Envelope::Error {
                    kind: kind.to_string(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Envelope::Success { data, .. } => Some(data),
            Envelope::Error { .. } => None,
        }
    }
}

/// `{video_id, provider, chapters?}`. `chapters` is kept raw so malformed
/// input can be reported as a missing dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub video_id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Value>,
}

pub struct LectureService {
    providers: ProviderRegistry,
    pipeline: ArtifactPipeline,
    orchestrator: Orchestrator,
    store: Arc<dyn DocumentStore>,
    // serialises read-modify-write of sessions and student records
    records: Arc<Mutex<()>>,
}

impl LectureService {
    pub fn new(
        providers: ProviderRegistry,
        reformatter: Arc<dyn Reformatter>,
        orchestrator: Orchestrator,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            providers,
            pipeline: ArtifactPipeline::new(reformatter),
            orchestrator,
            store,
            records: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            ProviderRegistry::from_config(config),
            Arc::new(ChatReformatter::from_config(config)),
            Orchestrator::new(config.stream_buffer),
            store,
        )
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    async fn load_session(&self, video_id: &str) -> Result<Option<VideoSession>> {
        Ok(store::load(self.store.as_ref(), &video_key(video_id)).await?)
    }

    async fn save_session(&self, session: &VideoSession) -> Result<()> {
        Ok(store::save(self.store.as_ref(), &video_key(&session.video_id), session).await?)
    }

    /// Load-or-create a session, apply `f`, persist it.
    async fn modify_session<T>(
        &self,
        video_id: &str,
        f: impl FnOnce(&mut VideoSession) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.records.lock().await;
        let mut session = self
            .load_session(video_id)
            .await?
            .unwrap_or_else(|| VideoSession::new(video_id));
        let out = f(&mut session)?;
        self.save_session(&session).await?;
        Ok(out)
    }

    async fn published_course(&self, video_id: &str) -> Result<Course> {
        self.load_session(video_id)
            .await?
            .and_then(|s| s.course)
            .ok_or_else(|| {
                LecternError::NotFound(format!("no published course for video {video_id}"))
            })
    }

    pub async fn register_video(&self, video_id: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("video_id", video_id)?;
            let status = self.modify_session(video_id, |s| Ok(s.status)).await?;
            info!(video_id, "Video registered");
            Ok(json!({ "video_id": video_id, "status": status }))
        }
        .await;
        Envelope::from_result("upload_video", None, started, result)
    }

    pub async fn cached_analysis(&self, video_id: &str, provider: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("video_id", video_id)?;
            let adapter = self.providers.resolve(provider)?;
            let gist = self.pipeline.generate_gist(adapter.as_ref(), video_id).await?;
            let data = serde_json::to_value(&gist)?;
            self.modify_session(video_id, |s| {
                s.record_gist(gist);
                Ok(())
            })
            .await?;
            Ok(data)
        }
        .await;
        Envelope::from_result("gist", provider.parse().ok(), started, result)
    }

    pub async fn generate(&self, kind: ArtifactKind, request: GenerationRequest) -> Envelope {
        let started = Instant::now();
        let result = self.try_generate(kind, &request).await;
        Envelope::from_result(kind.as_str(), request.provider.parse().ok(), started, result)
    }

    async fn try_generate(&self, kind: ArtifactKind, request: &GenerationRequest) -> Result<Value> {
        require("video_id", &request.video_id)?;
        let adapter = self.providers.resolve(&request.provider)?;

        let chapters = if !kind.requires_chapters() {
            Vec::new()
        } else if request.chapters.is_some() {
            chapters_from_json(kind, request.chapters.as_ref())?
        } else {
            // fall back to chapters generated earlier for this video
            let drafted = self
                .load_session(&request.video_id)
                .await?
                .and_then(|s| s.drafts.chapters)
                .unwrap_or_default();
            chapters_from_json(kind, Some(&serde_json::to_value(drafted)?))?
        };

        let generated = self
            .pipeline
            .generate_artifact(kind, adapter.as_ref(), &request.video_id, &chapters)
            .await?;
        if generated.repaired {
            info!(artifact = %kind, video_id = %request.video_id, "Artifact needed repair");
        }

        let data = serde_json::to_value(&generated.value)?;
        self.modify_session(&request.video_id, |s| s.record(generated.value))
            .await?;
        Ok(data)
    }

    /// Streamed lecture analysis. Setup failures arrive as a single error event.
    pub fn analyze_lecture(
        &self,
        video_id: &str,
        provider: &str,
    ) -> BoxStream<'static, StreamEvent> {
        let run = require("video_id", video_id)
            .and_then(|_| self.providers.resolve(provider))
            .and_then(|adapter| self.orchestrator.run(adapter, video_id, lecture_tasks()));

        match run {
            Ok(events) => events,
            Err(e) => {
                warn!(video_id, error = %e, "Could not start streamed analysis");
                let message = e.to_string();
                stream::once(async move { StreamEvent::error("analysis", message) }).boxed()
            }
        }
    }

    pub async fn publish_course(&self, course: Course) -> Envelope {
        let started = Instant::now();
        let result = self.try_publish(course).await;
        Envelope::from_result("publish_course", None, started, result)
    }

    /// Publish whatever has been generated for the video so far.
    pub async fn publish_drafts(&self, video_id: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            let session = self
                .load_session(video_id)
                .await?
                .ok_or_else(|| {
                    LecternError::NotFound(format!("video {video_id} is not registered"))
                })?;
            self.try_publish(session.draft_course()).await
        }
        .await;
        Envelope::from_result("publish_course", None, started, result)
    }

    async fn try_publish(&self, course: Course) -> Result<Value> {
        course.ensure_complete()?;
        let video_id = course.video_id.clone();
        let published_at = self
            .modify_session(&video_id, |s| {
                s.publish(course)?;
                Ok(s.published_at)
            })
            .await?;
        info!(video_id = %video_id, "Course published");
        Ok(json!({ "video_id": video_id, "published_at": published_at }))
    }

    pub async fn published_courses(&self) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            let mut courses = Vec::new();
            for (key, item) in self.store.scan("video/").await? {
                let session: VideoSession = serde_json::from_value(item)
                    .map_err(|e| LecternError::InvalidRequest(format!("corrupt item {key}: {e}")))?;
                if let Some(course) = session.course {
                    courses.push(course);
                }
            }
            Ok(stringify_numbers(serde_json::to_value(courses)?))
        }
        .await;
        Envelope::from_result("published_courses", None, started, result)
    }

    pub async fn course_metadata(&self, video_id: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            let course = self.published_course(video_id).await?;
            Ok(stringify_numbers(serde_json::to_value(course)?))
        }
        .await;
        Envelope::from_result("course_metadata", None, started, result)
    }

    pub async fn save_reaction(&self, video_id: &str, reaction: Value) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("video_id", video_id)?;
            if reaction.is_null() || reaction.as_str().is_some_and(|r| r.trim().is_empty()) {
                return Err(LecternError::InvalidRequest(
                    "video_id and reaction are required".into(),
                ));
            }
            let id = self
                .modify_session(video_id, |s| Ok(s.add_reaction(reaction).id))
                .await?;
            Ok(json!({ "id": id }))
        }
        .await;
        Envelope::from_result("save_student_reaction", None, started, result)
    }

    pub async fn reactions(&self, video_id: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("video_id", video_id)?;
            let reactions = self
                .load_session(video_id)
                .await?
                .map(|s| s.reactions)
                .unwrap_or_default();
            Ok(stringify_numbers(serde_json::to_value(reactions)?))
        }
        .await;
        Envelope::from_result("student_reactions", None, started, result)
    }

    pub async fn save_wrong_answer(
        &self,
        student_name: &str,
        video_id: &str,
        wrong_answer: WrongAnswer,
    ) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("student_name", student_name)?;
            require("video_id", video_id)?;
            require("wrong_answer", &wrong_answer.question)?;

            let _guard = self.records.lock().await;
            let key = student_key(student_name);
            let mut record = store::load::<StudentRecord>(self.store.as_ref(), &key)
                .await?
                .unwrap_or_else(|| StudentRecord::new(student_name));
            record.add_wrong_answer(video_id, wrong_answer);
            store::save(self.store.as_ref(), &key, &record).await?;

            Ok(json!({ "wrong_answers": record.wrong_answers(video_id).len() }))
        }
        .await;
        Envelope::from_result("save_wrong_answer", None, started, result)
    }

    /// Score a student's quiz. The report is persisted in the background and
    /// does not delay the response.
    pub async fn score_quiz(&self, student_name: &str, video_id: &str, provider: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            require("student_name", student_name)?;
            let adapter = self.providers.resolve(provider)?;
            let course = self.published_course(video_id).await?;
            let key = student_key(student_name);
            let wrong_answers = store::load::<StudentRecord>(self.store.as_ref(), &key)
                .await?
                .map(|r| r.wrong_answers(video_id).to_vec())
                .unwrap_or_default();

            let report = assembly::calculate_quiz_performance(
                &self.pipeline,
                adapter.as_ref(),
                &course,
                &wrong_answers,
            )
            .await?;
            let data = serde_json::to_value(&report)?;

            tokio::spawn(persist_progress(
                Arc::clone(&self.store),
                Arc::clone(&self.records),
                student_name.to_string(),
                video_id.to_string(),
                report,
            ));
            Ok(data)
        }
        .await;
        Envelope::from_result("quiz_performance", provider.parse().ok(), started, result)
    }

    pub async fn course_analysis(&self, video_id: &str, provider: &str) -> Envelope {
        let started = Instant::now();
        let result: Result<Value> = async {
            let adapter = self.providers.resolve(provider)?;
            let course = self.published_course(video_id).await?;
            let students = self
                .store
                .scan("student/")
                .await?
                .into_iter()
                .map(|(_, item)| serde_json::from_value::<StudentRecord>(item))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let analysis = assembly::generate_course_analysis(
                &self.pipeline,
                adapter.as_ref(),
                &course,
                &students,
            )
            .await?;
            Ok(serde_json::to_value(analysis)?)
        }
        .await;
        Envelope::from_result("course_analysis", provider.parse().ok(), started, result)
    }
}

async fn persist_progress(
    store: Arc<dyn DocumentStore>,
    records: Arc<Mutex<()>>,
    student_name: String,
    video_id: String,
    report: ProgressReport,
) {
    let _guard = records.lock().await;
    let key = student_key(&student_name);
    let result: Result<()> = async {
        let mut record = store::load::<StudentRecord>(store.as_ref(), &key)
            .await?
            .unwrap_or_else(|| StudentRecord::new(&student_name));
        record.set_progress_report(&video_id, report);
        store::save(store.as_ref(), &key, &record).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => info!(student = %student_name, video_id = %video_id, "Progress report saved"),
        Err(e) => error!(
            student = %student_name,
            video_id = %video_id,
            error = %e,
            "Failed to save progress report"
        ),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(LecternError::InvalidRequest(format!("{field} is required")))
    } else {
        Ok(())
    }
}
