//! Validate-or-repair generation: one provider call, a strict decode, and at
//! most one reformatting pass when the output does not fit its schema.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{LecternError, Result},
    prompts::{self, QuizAttempt},
    provider::VideoProvider,
    repair::Reformatter,
    schema::{
        Artifact, ArtifactKind, ArtifactSchema, ChaptersSchema, ConceptMasterySchema,
        CourseAnalysisSchema, EngagementSchema, FlashcardsSchema, KeyTakeawaysSchema,
        PacingRecommendationsSchema, QuizQuestionsSchema, StudyRecommendationsSchema, SummarySchema,
        TranscriptSchema, ValidationContext, coerce, decode,
    },
    types::{
        Chapter, ConceptMastery, CourseAnalysis, EngagementEvent, Flashcard, Gist,
        PacingRecommendation, QuizQuestion, StudyRecommendation,
    },
};

/// A generated artifact and whether it went through repair.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    pub repaired: bool,
}

impl<T> Generated<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        Generated {
            value: f(self.value),
            repaired: self.repaired,
        }
    }
}

#[derive(Clone)]
pub struct ArtifactPipeline {
    reformatter: Arc<dyn Reformatter>,
}

impl ArtifactPipeline {
    pub fn new(reformatter: Arc<dyn Reformatter>) -> Self {
        Self { reformatter }
    }

    pub async fn generate<S: ArtifactSchema>(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        prompt: &str,
        ctx: &ValidationContext,
    ) -> Result<Generated<S>> {
        debug!(artifact = %S::KIND, provider = %provider.kind(), video_id, "Generating artifact");

        let raw = provider
            .analyze(video_id, prompt)
            .await
            .map_err(|source| LecternError::Generation {
                artifact: S::KIND,
                source,
            })?;

        match decode::<S>(&raw, ctx) {
            Ok(value) => Ok(Generated { value, repaired: false }),
            Err(err) => {
                warn!(
                    artifact = %S::KIND,
                    provider = %provider.kind(),
                    detail = %err.detail,
                    "Output failed validation, reformatting"
                );
                let repaired = self.reformatter.reformat(&raw, &S::descriptor()).await?;
                let value = coerce::<S>(repaired)?;
                info!(artifact = %S::KIND, "Artifact repaired");
                Ok(Generated { value, repaired: true })
            }
        }
    }

    async fn generate_plain<S: ArtifactSchema>(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        prompt: String,
    ) -> Result<S> {
        self.generate::<S>(provider, video_id, &prompt, &ValidationContext::default())
            .await
            .map(|g| g.value)
    }

    pub async fn generate_summary(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<String> {
        let s: SummarySchema = self
            .generate_plain(provider, video_id, prompts::summary())
            .await?;
        Ok(s.summary)
    }

    pub async fn generate_key_takeaways(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<Vec<String>> {
        let s: KeyTakeawaysSchema = self
            .generate_plain(provider, video_id, prompts::key_takeaways())
            .await?;
        Ok(s.key_takeaways)
    }

    pub async fn generate_pacing_recommendations(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<Vec<PacingRecommendation>> {
        let s: PacingRecommendationsSchema = self
            .generate_plain(provider, video_id, prompts::pacing_recommendations())
            .await?;
        Ok(s.recommendations)
    }

    pub async fn generate_chapters(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<Vec<Chapter>> {
        let s: ChaptersSchema = self
            .generate_plain(provider, video_id, prompts::chapters())
            .await?;
        Ok(s.chapters)
    }

    /// Needs the video's chapters; fails before calling the provider without them.
    pub async fn generate_quiz_questions(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        chapters: &[Chapter],
    ) -> Result<Vec<QuizQuestion>> {
        let chapters = require_chapters(ArtifactKind::QuizQuestions, chapters)?;
        let s: QuizQuestionsSchema = self
            .generate(
                provider,
                video_id,
                &prompts::quiz_questions(&chapters),
                &ValidationContext::with_chapters(&chapters),
            )
            .await?
            .value;
        Ok(s.quiz_questions)
    }

    pub async fn generate_flashcards(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        chapters: &[Chapter],
    ) -> Result<Vec<Flashcard>> {
        let chapters = require_chapters(ArtifactKind::Flashcards, chapters)?;
        let s: FlashcardsSchema = self
            .generate(
                provider,
                video_id,
                &prompts::flashcards(&chapters),
                &ValidationContext::with_chapters(&chapters),
            )
            .await?
            .value;
        Ok(s.flashcards)
    }

    pub async fn generate_engagement(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<Vec<EngagementEvent>> {
        let s: EngagementSchema = self
            .generate_plain(provider, video_id, prompts::engagement())
            .await?;
        Ok(s.engagement)
    }

    pub async fn generate_transcript(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<String> {
        let s: TranscriptSchema = self
            .generate_plain(provider, video_id, prompts::transcript())
            .await?;
        Ok(s.transcript)
    }

    /// Gists come from the provider already structured; nothing to repair.
    pub async fn generate_gist(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
    ) -> Result<Gist> {
        debug!(provider = %provider.kind(), video_id, "Fetching gist");
        Ok(provider.gist(video_id).await?)
    }

    pub async fn generate_study_recommendations(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        attempt: &QuizAttempt<'_>,
    ) -> Result<Vec<StudyRecommendation>> {
        let chapters = require_chapters(ArtifactKind::StudyRecommendations, attempt.chapters)?;
        let attempt = QuizAttempt {
            chapters: &chapters,
            ..*attempt
        };
        let s: StudyRecommendationsSchema = self
            .generate(
                provider,
                video_id,
                &prompts::study_recommendations(&attempt),
                &ValidationContext::with_chapters(&chapters),
            )
            .await?
            .value;
        Ok(s.study_recommendations)
    }

    pub async fn generate_concept_mastery(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        attempt: &QuizAttempt<'_>,
    ) -> Result<Vec<ConceptMastery>> {
        let s: ConceptMasterySchema = self
            .generate_plain(provider, video_id, prompts::concept_mastery(attempt))
            .await?;
        Ok(s.concept_mastery)
    }

    pub async fn generate_course_analysis(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        chapters: &[Chapter],
        student_data: &Value,
    ) -> Result<CourseAnalysis> {
        let student_data = serde_json::to_string_pretty(student_data)?;
        let s: CourseAnalysisSchema = self
            .generate_plain(provider, video_id, prompts::course_analysis(chapters, &student_data))
            .await?;
        Ok(s.course_analysis)
    }

    /// Dispatch on a caller-supplied artifact type. Student-result artifacts
    /// are produced by assembly, not here.
    pub async fn generate_artifact(
        &self,
        kind: ArtifactKind,
        provider: &dyn VideoProvider,
        video_id: &str,
        chapters: &[Chapter],
    ) -> Result<Generated<Artifact>> {
        let ctx = ValidationContext::default();
        match kind {
            ArtifactKind::QuizQuestions => {
                let chapters = require_chapters(kind, chapters)?;
                let prompt = prompts::quiz_questions(&chapters);
                let ctx = ValidationContext::with_chapters(&chapters);
                self.dispatch::<QuizQuestionsSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::Flashcards => {
                let chapters = require_chapters(kind, chapters)?;
                let prompt = prompts::flashcards(&chapters);
                let ctx = ValidationContext::with_chapters(&chapters);
                self.dispatch::<FlashcardsSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::Summary => {
                self.dispatch::<SummarySchema>(provider, video_id, &prompts::summary(), &ctx)
                    .await
            }
            ArtifactKind::KeyTakeaways => {
                let prompt = prompts::key_takeaways();
                self.dispatch::<KeyTakeawaysSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::PacingRecommendations => {
                let prompt = prompts::pacing_recommendations();
                self.dispatch::<PacingRecommendationsSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::Chapters => {
                self.dispatch::<ChaptersSchema>(provider, video_id, &prompts::chapters(), &ctx)
                    .await
            }
            ArtifactKind::Engagement => {
                let prompt = prompts::engagement();
                self.dispatch::<EngagementSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::Transcript => {
                let prompt = prompts::transcript();
                self.dispatch::<TranscriptSchema>(provider, video_id, &prompt, &ctx)
                    .await
            }
            ArtifactKind::StudyRecommendations
            | ArtifactKind::ConceptMastery
            | ArtifactKind::CourseAnalysis => Err(LecternError::InvalidRequest(format!(
                "{kind} is generated from student results, not on request"
            ))),
        }
    }

    async fn dispatch<S: ArtifactSchema>(
        &self,
        provider: &dyn VideoProvider,
        video_id: &str,
        prompt: &str,
        ctx: &ValidationContext,
    ) -> Result<Generated<Artifact>> {
        Ok(self
            .generate::<S>(provider, video_id, prompt, ctx)
            .await?
            .map(S::into_artifact))
    }
}

/// Chapters as referenced by dependent artifacts: non-empty, with ids.
/// Chapters supplied without ids are numbered by position.
fn require_chapters(artifact: ArtifactKind, chapters: &[Chapter]) -> Result<Vec<Chapter>> {
    if chapters.is_empty() {
        return Err(LecternError::MissingDependency {
            artifact,
            dependency: "chapters",
        });
    }

    let mut chapters = chapters.to_vec();
    if chapters.iter().any(|c| c.chapter_id == 0) {
        for (i, chapter) in chapters.iter_mut().enumerate() {
            chapter.chapter_id = i as u32 + 1;
        }
    }
    Ok(chapters)
}

/// Chapters as supplied in a JSON request: must be a non-empty array.
pub fn chapters_from_json(
    artifact: ArtifactKind,
    chapters: Option<&Value>,
) -> Result<Vec<Chapter>> {
    let missing = || LecternError::MissingDependency {
        artifact,
        dependency: "chapters",
    };

    let items = chapters.and_then(Value::as_array).ok_or_else(missing)?;
    if items.is_empty() {
        return Err(missing());
    }

    items
        .iter()
        .map(|item| {
            serde_json::from_value::<Chapter>(item.clone())
                .map_err(|e| LecternError::InvalidRequest(format!("invalid chapter: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn chapters_field_must_be_a_non_empty_array() {
        for body in [json!({}), json!({"chapters": "intro"}), json!({"chapters": []})] {
            assert_matches!(
                chapters_from_json(ArtifactKind::QuizQuestions, body.get("chapters")),
                Err(LecternError::MissingDependency { dependency: "chapters", .. })
            );
        }

        let body = json!({
            "chapters": [{"title": "t", "summary": "s", "start_time": "0", "end_time": 30}]
        });
        let chapters =
            chapters_from_json(ArtifactKind::QuizQuestions, body.get("chapters")).unwrap();
        assert_eq!(chapters[0].end_time, 30.0);
    }

    #[test]
    fn chapters_without_ids_are_numbered_by_position() {
        let chapter = |title: &str, id| Chapter {
            title: title.into(),
            summary: "s".into(),
            start_time: 0.0,
            end_time: 1.0,
            chapter_id: id,
        };

        let ids = |chapters: Vec<Chapter>| {
            chapters
                .iter()
                .map(|c| c.chapter_id)
                .collect::<Vec<_>>()
        };

        let numbered = [chapter("a", 0), chapter("b", 0)];
        let numbered = require_chapters(ArtifactKind::Flashcards, &numbered).unwrap();
        assert_eq!(ids(numbered), vec![1, 2]);

        let kept = [chapter("a", 4), chapter("b", 7)];
        let kept = require_chapters(ArtifactKind::Flashcards, &kept).unwrap();
        assert_eq!(ids(kept), vec![4, 7]);
    }
}
