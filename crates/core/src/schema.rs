//! Schema registry: every structured artifact the pipeline can produce, with
//! a strict decode path for provider output and a permissive coerce path for
//! repaired output.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{LecternError, RepairFailure, ValidationError},
    types::{
        Chapter, ConceptMastery, CourseAnalysis, EngagementEvent, Flashcard,
        PacingRecommendation, QuizQuestion, StudyRecommendation,
    },
};

pub const MAX_CHAPTERS: usize = 9;
pub const MAX_ENGAGEMENT_EVENTS: usize = 5;
pub const LEVEL_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Summary,
    KeyTakeaways,
    PacingRecommendations,
    Chapters,
    QuizQuestions,
    Flashcards,
    Engagement,
    #[serde(rename = "multimodal_transcript")]
    Transcript,
    StudyRecommendations,
    ConceptMastery,
    CourseAnalysis,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 11] = [
        ArtifactKind::Summary,
        ArtifactKind::KeyTakeaways,
        ArtifactKind::PacingRecommendations,
        ArtifactKind::Chapters,
        ArtifactKind::QuizQuestions,
        ArtifactKind::Flashcards,
        ArtifactKind::Engagement,
        ArtifactKind::Transcript,
        ArtifactKind::StudyRecommendations,
        ArtifactKind::ConceptMastery,
        ArtifactKind::CourseAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::KeyTakeaways => "key_takeaways",
            ArtifactKind::PacingRecommendations => "pacing_recommendations",
            ArtifactKind::Chapters => "chapters",
            ArtifactKind::QuizQuestions => "quiz_questions",
            ArtifactKind::Flashcards => "flashcards",
            ArtifactKind::Engagement => "engagement",
            ArtifactKind::Transcript => "multimodal_transcript",
            ArtifactKind::StudyRecommendations => "study_recommendations",
            ArtifactKind::ConceptMastery => "concept_mastery",
            ArtifactKind::CourseAnalysis => "course_analysis",
        }
    }

    /// Artifacts that need the video's chapters before they can be generated.
    pub fn requires_chapters(&self) -> bool {
        matches!(self, ArtifactKind::QuizQuestions | ArtifactKind::Flashcards)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = LecternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase().replace('-', "_");
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str() == tag || (tag == "transcript" && *kind == ArtifactKind::Transcript)
            })
            .ok_or_else(|| LecternError::InvalidRequest(format!("unknown artifact type: {s}")))
    }
}

/// What the reformatter is told about the target shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub kind: ArtifactKind,
    pub name: &'static str,
    /// JSON shape with field types, as shown to models.
    pub shape: &'static str,
}

impl SchemaDescriptor {
    pub fn for_kind(kind: ArtifactKind) -> Self {
        let (name, shape) = match kind {
            ArtifactKind::Summary => ("SummarySchema", r#"{"summary": string}"#),
            ArtifactKind::KeyTakeaways => ("KeyTakeawaysSchema", r#"{"key_takeaways": [string]}"#),
            ArtifactKind::PacingRecommendations => (
                "PacingRecommendationsSchema",
                concat!(
                    r#"{"recommendations": [{"start_time": float, "end_time": float, "#,
                    r#""recommendation": string, "severity": string}]}"#,
                ),
            ),
            ArtifactKind::Chapters => (
                "ChaptersSchema",
                concat!(
                    r#"{"chapters": [{"title": string, "summary": string, "#,
                    r#""start_time": float, "end_time": float, "chapter_id": int}]}"#,
                ),
            ),
            ArtifactKind::QuizQuestions => (
                "QuizQuestionsSchema",
                concat!(
                    r#"{"quiz_questions": [{"question": string, "answer": string, "#,
                    r#""wrong_answers": [string], "chapter_id": int, "#,
                    r#""answer_explanation": string, "hint": string}]}"#,
                ),
            ),
            ArtifactKind::Flashcards => (
                "FlashcardsSchema",
                r#"{"flashcards": [{"concept": string, "definition": string, "chapter_id": int}]}"#,
            ),
            ArtifactKind::Engagement => (
                "EngagementSchema",
                concat!(
                    r#"{"engagement": [{"emotion": "#,
                    r#""happy"|"sad"|"angry"|"surprised"|"confused"|"bored", "#,
                    r#""engagement_level": int (1-10), "description": string, "#,
                    r#""reason": string, "timestamp": float}]}"#,
                ),
            ),
            ArtifactKind::Transcript => ("TranscriptSchema", r#"{"transcript": string}"#),
            ArtifactKind::StudyRecommendations => (
                "StudyRecommendationsSchema",
                concat!(
                    r#"{"study_recommendations": [{"priority": "high"|"medium"|"low", "#,
                    r#""time_to_review": string, "title": string, "description": string, "#,
                    r#""recommended_chapters": [int]}]}"#,
                ),
            ),
            ArtifactKind::ConceptMastery => (
                "ConceptMasterySchema",
                concat!(
                    r#"{"concept_mastery": [{"concept": string, "mastery_level": int (1-10), "#,
                    r#""chapter_title": string, "reasoning": string}]}"#,
                ),
            ),
            ArtifactKind::CourseAnalysis => (
                "CourseAnalysisSchema",
                concat!(
                    r#"{"course_analysis": {"overview": string, "strengths": [string], "#,
                    r#""improvement_areas": [string], "struggling_concepts": [string], "#,
                    r#""recommendations": [string]}}"#,
                ),
            ),
        };

        Self { kind, name, shape }
    }
}

/// Cross-artifact facts a schema may check against.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    chapter_ids: Option<BTreeSet<u32>>,
}

impl ValidationContext {
    pub fn with_chapters(chapters: &[Chapter]) -> Self {
        Self {
            chapter_ids: Some(chapters.iter().map(|c| c.chapter_id).collect()),
        }
    }

    fn check_chapter(&self, kind: ArtifactKind, chapter_id: u32) -> Result<(), ValidationError> {
        match &self.chapter_ids {
            Some(ids) if !ids.contains(&chapter_id) => Err(ValidationError::new(
                kind,
                format!("chapter_id {chapter_id} does not refer to a known chapter"),
            )),
            _ => Ok(()),
        }
    }
}

/// Any generated artifact, serialised as its bare payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Artifact {
    Summary(String),
    KeyTakeaways(Vec<String>),
    PacingRecommendations(Vec<PacingRecommendation>),
    Chapters(Vec<Chapter>),
    QuizQuestions(Vec<QuizQuestion>),
    Flashcards(Vec<Flashcard>),
    Engagement(Vec<EngagementEvent>),
    Transcript(String),
    StudyRecommendations(Vec<StudyRecommendation>),
    ConceptMastery(Vec<ConceptMastery>),
    CourseAnalysis(CourseAnalysis),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Summary(_) => ArtifactKind::Summary,
            Artifact::KeyTakeaways(_) => ArtifactKind::KeyTakeaways,
            Artifact::PacingRecommendations(_) => ArtifactKind::PacingRecommendations,
            Artifact::Chapters(_) => ArtifactKind::Chapters,
            Artifact::QuizQuestions(_) => ArtifactKind::QuizQuestions,
            Artifact::Flashcards(_) => ArtifactKind::Flashcards,
            Artifact::Engagement(_) => ArtifactKind::Engagement,
            Artifact::Transcript(_) => ArtifactKind::Transcript,
            Artifact::StudyRecommendations(_) => ArtifactKind::StudyRecommendations,
            Artifact::ConceptMastery(_) => ArtifactKind::ConceptMastery,
            Artifact::CourseAnalysis(_) => ArtifactKind::CourseAnalysis,
        }
    }
}

/// A structured artifact with its own wire envelope and validation rules.
pub trait ArtifactSchema: Serialize + DeserializeOwned + Send + Sized + 'static {
    const KIND: ArtifactKind;

    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::for_kind(Self::KIND)
    }

    /// Canonicalise after parsing. Applied to both decoded and repaired output.
    fn normalize(&mut self) {}

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError>;

    /// Fallback for artifacts whose natural form is plain prose.
    fn from_text(_raw: &str) -> Option<Self> {
        None
    }

    fn into_artifact(self) -> Artifact;
}

fn ensure(
    kind: ArtifactKind,
    condition: bool,
    detail: impl FnOnce() -> String,
) -> Result<(), ValidationError> {
    if condition {
        Ok(())
    } else {
        Err(ValidationError::new(kind, detail()))
    }
}

fn ensure_span(
    kind: ArtifactKind,
    index: usize,
    start: f64,
    end: f64,
) -> Result<(), ValidationError> {
    let ordered = start.is_finite() && end.is_finite() && 0.0 <= start && start < end;
    ensure(kind, ordered, || {
        format!("item {index}: expected 0 <= start_time < end_time, got {start}..{end}")
    })
}

fn ensure_text(
    kind: ArtifactKind,
    field: &str,
    index: usize,
    value: &str,
) -> Result<(), ValidationError> {
    ensure(kind, !value.trim().is_empty(), || {
        format!("item {index}: {field} is empty")
    })
}

/// Strip a Markdown fence and surrounding prose, leaving the JSON payload.
pub fn extract_json(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        text = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Strict path: parse provider text and enforce every rule of `S`.
pub fn decode<S: ArtifactSchema>(raw: &str, ctx: &ValidationContext) -> Result<S, ValidationError> {
    let mut parsed = match serde_json::from_str::<S>(extract_json(raw)) {
        Ok(parsed) => parsed,
        Err(err) => S::from_text(raw)
            .ok_or_else(|| ValidationError::new(S::KIND, err.to_string()))?,
    };

    parsed.normalize();
    parsed.validate(ctx)?;
    Ok(parsed)
}

/// Permissive path for reformatter output: only the shape has to fit.
pub fn coerce<S: ArtifactSchema>(value: Value) -> Result<S, RepairFailure> {
    let mut parsed = match value {
        Value::String(text) => serde_json::from_str::<S>(extract_json(&text))
            .ok()
            .or_else(|| S::from_text(&text))
            .ok_or_else(|| RepairFailure::new(S::KIND, "reformatter returned unparseable text"))?,
        value => serde_json::from_value::<S>(value).map_err(|err| {
            RepairFailure::new(
                S::KIND,
                format!("reformatter output does not fit schema: {err}"),
            )
        })?,
    };

    parsed.normalize();
    Ok(parsed)
}

fn plain_text(raw: &str) -> Option<String> {
    let text = raw.trim();
    let structured = text.starts_with('{') || text.starts_with('[') || text.starts_with("```");
    if text.is_empty() || structured {
        None
    } else {
        Some(text.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySchema {
    pub summary: String,
}

impl ArtifactSchema for SummarySchema {
    const KIND: ArtifactKind = ArtifactKind::Summary;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure_text(Self::KIND, "summary", 0, &self.summary)
    }

    fn from_text(raw: &str) -> Option<Self> {
        plain_text(raw).map(|summary| Self { summary })
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Summary(self.summary)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyTakeawaysSchema {
    pub key_takeaways: Vec<String>,
}

impl ArtifactSchema for KeyTakeawaysSchema {
    const KIND: ArtifactKind = ArtifactKind::KeyTakeaways;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure(Self::KIND, !self.key_takeaways.is_empty(), || "no key takeaways".into())?;
        for (i, takeaway) in self.key_takeaways.iter().enumerate() {
            ensure_text(Self::KIND, "key takeaway", i, takeaway)?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::KeyTakeaways(self.key_takeaways)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingRecommendationsSchema {
    pub recommendations: Vec<PacingRecommendation>,
}

impl ArtifactSchema for PacingRecommendationsSchema {
    const KIND: ArtifactKind = ArtifactKind::PacingRecommendations;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        for (i, rec) in self.recommendations.iter().enumerate() {
            ensure_span(Self::KIND, i, rec.start_time, rec.end_time)?;
            ensure_text(Self::KIND, "recommendation", i, &rec.recommendation)?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::PacingRecommendations(self.recommendations)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaptersSchema {
    pub chapters: Vec<Chapter>,
}

impl ArtifactSchema for ChaptersSchema {
    const KIND: ArtifactKind = ArtifactKind::Chapters;

    /// Chapters are ordered by start time and numbered from 1.
    fn normalize(&mut self) {
        self.chapters
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        for (i, chapter) in self.chapters.iter_mut().enumerate() {
            chapter.chapter_id = i as u32 + 1;
        }
    }

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure(Self::KIND, !self.chapters.is_empty(), || "no chapters".into())?;
        ensure(Self::KIND, self.chapters.len() <= MAX_CHAPTERS, || {
            format!("{} chapters exceeds the maximum of {MAX_CHAPTERS}", self.chapters.len())
        })?;

        let mut seen = BTreeSet::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            ensure_text(Self::KIND, "title", i, &chapter.title)?;
            ensure_span(Self::KIND, i, chapter.start_time, chapter.end_time)?;
            ensure(Self::KIND, seen.insert(chapter.chapter_id), || {
                format!("duplicate chapter_id {}", chapter.chapter_id)
            })?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Chapters(self.chapters)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestionsSchema {
    pub quiz_questions: Vec<QuizQuestion>,
}

impl ArtifactSchema for QuizQuestionsSchema {
    const KIND: ArtifactKind = ArtifactKind::QuizQuestions;

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure(Self::KIND, !self.quiz_questions.is_empty(), || "no quiz questions".into())?;
        for (i, q) in self.quiz_questions.iter().enumerate() {
            ensure_text(Self::KIND, "question", i, &q.question)?;
            ensure_text(Self::KIND, "answer", i, &q.answer)?;
            ensure(Self::KIND, !q.wrong_answers.is_empty(), || {
                format!("item {i}: wrong_answers is empty")
            })?;
            ctx.check_chapter(Self::KIND, q.chapter_id)?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::QuizQuestions(self.quiz_questions)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardsSchema {
    pub flashcards: Vec<Flashcard>,
}

impl ArtifactSchema for FlashcardsSchema {
    const KIND: ArtifactKind = ArtifactKind::Flashcards;

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure(Self::KIND, !self.flashcards.is_empty(), || "no flashcards".into())?;
        for (i, card) in self.flashcards.iter().enumerate() {
            ensure_text(Self::KIND, "concept", i, &card.concept)?;
            ensure_text(Self::KIND, "definition", i, &card.definition)?;
            ctx.check_chapter(Self::KIND, card.chapter_id)?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Flashcards(self.flashcards)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSchema {
    pub engagement: Vec<EngagementEvent>,
}

impl ArtifactSchema for EngagementSchema {
    const KIND: ArtifactKind = ArtifactKind::Engagement;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure(Self::KIND, self.engagement.len() <= MAX_ENGAGEMENT_EVENTS, || {
            format!(
                "{} engagement events exceeds the maximum of {MAX_ENGAGEMENT_EVENTS}",
                self.engagement.len()
            )
        })?;
        for (i, event) in self.engagement.iter().enumerate() {
            ensure(Self::KIND, LEVEL_RANGE.contains(&event.engagement_level), || {
                format!("item {i}: engagement_level {} is outside 1..=10", event.engagement_level)
            })?;
            ensure(Self::KIND, event.timestamp.is_finite() && event.timestamp >= 0.0, || {
                format!("item {i}: timestamp {} is negative", event.timestamp)
            })?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Engagement(self.engagement)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSchema {
    pub transcript: String,
}

impl ArtifactSchema for TranscriptSchema {
    const KIND: ArtifactKind = ArtifactKind::Transcript;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure_text(Self::KIND, "transcript", 0, &self.transcript)
    }

    fn from_text(raw: &str) -> Option<Self> {
        plain_text(raw).map(|transcript| Self { transcript })
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Transcript(self.transcript)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyRecommendationsSchema {
    pub study_recommendations: Vec<StudyRecommendation>,
}

impl ArtifactSchema for StudyRecommendationsSchema {
    const KIND: ArtifactKind = ArtifactKind::StudyRecommendations;

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError> {
        for (i, rec) in self.study_recommendations.iter().enumerate() {
            ensure_text(Self::KIND, "title", i, &rec.title)?;
            for chapter_id in &rec.recommended_chapters {
                ctx.check_chapter(Self::KIND, *chapter_id)?;
            }
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::StudyRecommendations(self.study_recommendations)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMasterySchema {
    pub concept_mastery: Vec<ConceptMastery>,
}

impl ArtifactSchema for ConceptMasterySchema {
    const KIND: ArtifactKind = ArtifactKind::ConceptMastery;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        for (i, item) in self.concept_mastery.iter().enumerate() {
            ensure_text(Self::KIND, "concept", i, &item.concept)?;
            ensure(Self::KIND, LEVEL_RANGE.contains(&item.mastery_level), || {
                format!("item {i}: mastery_level {} is outside 1..=10", item.mastery_level)
            })?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::ConceptMastery(self.concept_mastery)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseAnalysisSchema {
    pub course_analysis: CourseAnalysis,
}

impl ArtifactSchema for CourseAnalysisSchema {
    const KIND: ArtifactKind = ArtifactKind::CourseAnalysis;

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        ensure_text(Self::KIND, "overview", 0, &self.course_analysis.overview)
    }

    fn into_artifact(self) -> Artifact {
        Artifact::CourseAnalysis(self.course_analysis)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::types::Emotion;

    fn chapter(id: u32, start: f64, end: f64) -> Chapter {
        Chapter {
            title: format!("Chapter {id}"),
            summary: "summary".into(),
            start_time: start,
            end_time: end,
            chapter_id: id,
        }
    }

    #[test]
    fn artifact_kind_round_trips_through_tags() {
        for kind in ArtifactKind::ALL {
            assert_eq!(kind.as_str().parse::<ArtifactKind>().unwrap(), kind);
        }
        assert_eq!("Key-Takeaways".parse::<ArtifactKind>().unwrap(), ArtifactKind::KeyTakeaways);
        assert_matches!("slides".parse::<ArtifactKind>(), Err(LecternError::InvalidRequest(_)));
    }

    #[test]
    fn extract_json_strips_fences_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here you go: {\"a\": 1} enjoy"), "{\"a\": 1}");
        assert_eq!(extract_json("  [1, 2]  "), "[1, 2]");
    }

    #[test]
    fn confused_engagement_validates() {
        let raw = r#"{"engagement": [{"emotion": "confused", "engagement_level": 4,
            "description": "Students lose track", "reason": "Dense notation",
            "timestamp": 95.0}]}"#;

        let parsed = decode::<EngagementSchema>(raw, &ValidationContext::default()).unwrap();
        assert_eq!(parsed.engagement[0].emotion, Emotion::Confused);
    }

    #[test]
    fn unknown_emotion_fails_validation() {
        let raw = r#"{"engagement": [{"emotion": "excited", "engagement_level": 8,
            "description": "d", "reason": "r", "timestamp": 1.0}]}"#;

        let err = decode::<EngagementSchema>(raw, &ValidationContext::default()).unwrap_err();
        assert_eq!(err.artifact, ArtifactKind::Engagement);
    }

    #[test]
    fn too_many_engagement_events_fail() {
        let event = json!({
            "emotion": "happy", "engagement_level": 5,
            "description": "d", "reason": "r", "timestamp": 1
        });
        let raw = json!({ "engagement": vec![event; 6] }).to_string();

        assert!(decode::<EngagementSchema>(&raw, &ValidationContext::default()).is_err());
    }

    #[test]
    fn chapters_are_sorted_and_renumbered() {
        let raw = json!({"chapters": [
            {"title": "Second", "summary": "s", "start_time": 60, "end_time": 120, "chapter_id": 7},
            {"title": "First", "summary": "s", "start_time": "0", "end_time": "60", "chapter_id": 7}
        ]})
        .to_string();

        let parsed = decode::<ChaptersSchema>(&raw, &ValidationContext::default()).unwrap();
        let ids: Vec<_> = parsed
            .chapters
            .iter()
            .map(|c| (c.title.as_str(), c.chapter_id))
            .collect();
        assert_eq!(ids, vec![("First", 1), ("Second", 2)]);
    }

    #[test]
    fn chapters_reject_inverted_spans_and_overflow() {
        let inverted = json!({"chapters": [chapter(1, 30.0, 10.0)]}).to_string();
        assert!(decode::<ChaptersSchema>(&inverted, &ValidationContext::default()).is_err());

        let many: Vec<_> = (0..10)
            .map(|i| chapter(i, i as f64 * 10.0, i as f64 * 10.0 + 5.0))
            .collect();
        let overflow = json!({ "chapters": many }).to_string();
        assert!(decode::<ChaptersSchema>(&overflow, &ValidationContext::default()).is_err());
    }

    #[test]
    fn quiz_questions_must_reference_known_chapters() {
        let chapters = vec![chapter(1, 0.0, 10.0), chapter(2, 10.0, 20.0)];
        let ctx = ValidationContext::with_chapters(&chapters);
        let raw = json!({"quiz_questions": [{
            "question": "q", "answer": "a", "wrong_answers": ["b"], "chapter_id": 3
        }]})
        .to_string();

        let err = decode::<QuizQuestionsSchema>(&raw, &ctx).unwrap_err();
        assert!(err.detail.contains("chapter_id 3"));
    }

    #[test]
    fn summary_accepts_plain_prose() {
        let raw = "  A short lecture on limits.  ";
        let parsed = decode::<SummarySchema>(raw, &ValidationContext::default()).unwrap();
        assert_eq!(parsed.summary, "A short lecture on limits.");
    }

    #[test]
    fn coerce_skips_semantic_validation() {
        let value = json!({"engagement": [{"emotion": "bored", "engagement_level": 42,
            "description": "d", "reason": "r", "timestamp": 3}]});

        let parsed = coerce::<EngagementSchema>(value).unwrap();
        assert_eq!(parsed.engagement[0].engagement_level, 42);
    }

    #[test]
    fn coerce_rejects_wrong_shape() {
        let err = coerce::<ChaptersSchema>(json!({"sections": []})).unwrap_err();
        assert_eq!(err.artifact, ArtifactKind::Chapters);
    }
}
