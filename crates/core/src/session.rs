use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    assembly::ProgressReport,
    error::{LecternError, Result},
    schema::Artifact,
    types::{
        Chapter, EngagementEvent, Flashcard, Gist, PacingRecommendation, QuizQuestion, WrongAnswer,
    },
};

pub fn video_key(video_id: &str) -> String {
    format!("video/{video_id}")
}

pub fn student_key(student_name: &str) -> String {
    format!("student/{student_name}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Registered,
    PartiallyGenerated,
    Published,
}

/// Everything a published course carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Course {
    pub video_id: String,
    pub title: String,
    pub summary: String,
    pub chapters: Vec<Chapter>,
    pub quiz_questions: Vec<QuizQuestion>,
    pub key_takeaways: Vec<String>,
    pub pacing_recommendations: Vec<PacingRecommendation>,
    pub engagement: Vec<EngagementEvent>,
    pub transcript: String,
    pub flashcards: Vec<Flashcard>,
}

impl Course {
    /// Required fields that are absent or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("video_id", self.video_id.trim().is_empty()),
            ("title", self.title.trim().is_empty()),
            ("chapters", self.chapters.is_empty()),
            ("quiz_questions", self.quiz_questions.is_empty()),
            ("key_takeaways", self.key_takeaways.is_empty()),
            ("pacing_recommendations", self.pacing_recommendations.is_empty()),
            ("summary", self.summary.trim().is_empty()),
            ("engagement", self.engagement.is_empty()),
            ("transcript", self.transcript.trim().is_empty()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect()
    }

    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LecternError::InvalidRequest(format!("{} are required", missing.join(", "))))
        }
    }
}

/// Draft artifacts recorded as they are generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drafts {
    pub summary: Option<String>,
    pub key_takeaways: Option<Vec<String>>,
    pub pacing_recommendations: Option<Vec<PacingRecommendation>>,
    pub chapters: Option<Vec<Chapter>>,
    pub quiz_questions: Option<Vec<QuizQuestion>>,
    pub flashcards: Option<Vec<Flashcard>>,
    pub engagement: Option<Vec<EngagementEvent>>,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub reaction: Value,
    pub created_at: DateTime<Utc>,
}

/// A provider video and what has been generated for it.
/// `Registered -> PartiallyGenerated -> Published`; republishing overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSession {
    pub video_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub gist: Option<Gist>,
    #[serde(default)]
    pub drafts: Drafts,
    #[serde(default)]
    pub course: Option<Course>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl VideoSession {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            status: SessionStatus::Registered,
            gist: None,
            drafts: Drafts::default(),
            course: None,
            reactions: Vec::new(),
            created_at: Utc::now(),
            published_at: None,
        }
    }

    fn touch(&mut self) {
        if self.status == SessionStatus::Registered {
            self.status = SessionStatus::PartiallyGenerated;
        }
    }

    pub fn record_gist(&mut self, gist: Gist) {
        self.gist = Some(gist);
        self.touch();
    }

    /// Keep a generated artifact as a draft. The published course is untouched.
    pub fn record(&mut self, artifact: Artifact) -> Result<()> {
        let drafts = &mut self.drafts;
        match artifact {
            Artifact::Summary(v) => drafts.summary = Some(v),
            Artifact::KeyTakeaways(v) => drafts.key_takeaways = Some(v),
            Artifact::PacingRecommendations(v) => drafts.pacing_recommendations = Some(v),
            Artifact::Chapters(v) => drafts.chapters = Some(v),
            Artifact::QuizQuestions(v) => drafts.quiz_questions = Some(v),
            Artifact::Flashcards(v) => drafts.flashcards = Some(v),
            Artifact::Engagement(v) => drafts.engagement = Some(v),
            Artifact::Transcript(v) => drafts.transcript = Some(v),
            other => {
                return Err(LecternError::InvalidRequest(format!(
                    "{} belongs to a student, not a video",
                    other.kind()
                )));
            }
        }
        self.touch();
        Ok(())
    }

    /// A course assembled from the drafts, titled after the gist.
    pub fn draft_course(&self) -> Course {
        let d = self.drafts.clone();
        Course {
            video_id: self.video_id.clone(),
            title: self.gist.as_ref().map(|g| g.title.clone()).unwrap_or_default(),
            summary: d.summary.unwrap_or_default(),
            chapters: d.chapters.unwrap_or_default(),
            quiz_questions: d.quiz_questions.unwrap_or_default(),
            key_takeaways: d.key_takeaways.unwrap_or_default(),
            pacing_recommendations: d.pacing_recommendations.unwrap_or_default(),
            engagement: d.engagement.unwrap_or_default(),
            transcript: d.transcript.unwrap_or_default(),
            flashcards: d.flashcards.unwrap_or_default(),
        }
    }

    pub fn publish(&mut self, course: Course) -> Result<()> {
        course.ensure_complete()?;
        if course.video_id != self.video_id {
            return Err(LecternError::InvalidRequest(format!(
                "course is for video {}, not {}",
                course.video_id, self.video_id
            )));
        }
        self.course = Some(course);
        self.status = SessionStatus::Published;
        self.published_at = Some(Utc::now());
        Ok(())
    }

    pub fn add_reaction(&mut self, reaction: Value) -> &Reaction {
        self.reactions.push(Reaction {
            id: Uuid::new_v4(),
            reaction,
            created_at: Utc::now(),
        });
        &self.reactions[self.reactions.len() - 1]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentVideo {
    pub wrong_answers: Vec<WrongAnswer>,
    pub progress_report: Option<ProgressReport>,
}

/// Per-student quiz history, keyed by video id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_name: String,
    #[serde(default)]
    pub videos: BTreeMap<String, StudentVideo>,
}

impl StudentRecord {
    pub fn new(student_name: impl Into<String>) -> Self {
        Self {
            student_name: student_name.into(),
            videos: BTreeMap::new(),
        }
    }

    /// Wrong answers are only ever appended.
    pub fn add_wrong_answer(&mut self, video_id: &str, wrong_answer: WrongAnswer) {
        self.videos
            .entry(video_id.to_string())
            .or_default()
            .wrong_answers
            .push(wrong_answer);
    }

    pub fn wrong_answers(&self, video_id: &str) -> &[WrongAnswer] {
        self.videos
            .get(video_id)
            .map(|v| v.wrong_answers.as_slice())
            .unwrap_or_default()
    }

    pub fn set_progress_report(&mut self, video_id: &str, report: ProgressReport) {
        self.videos.entry(video_id.to_string()).or_default().progress_report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn complete_course(video_id: &str) -> Course {
        Course {
            video_id: video_id.into(),
            title: "Limits".into(),
            summary: "An intro to limits.".into(),
            chapters: vec![Chapter {
                title: "Intro".into(),
                summary: "s".into(),
                start_time: 0.0,
                end_time: 30.0,
                chapter_id: 1,
            }],
            quiz_questions: vec![QuizQuestion {
                question: "q".into(),
                answer: "a".into(),
                wrong_answers: vec!["b".into()],
                chapter_id: 1,
                answer_explanation: String::new(),
                hint: String::new(),
            }],
            key_takeaways: vec!["k".into()],
            pacing_recommendations: vec![PacingRecommendation {
                start_time: 0.0,
                end_time: 5.0,
                recommendation: "slow down".into(),
                severity: "low".into(),
            }],
            engagement: vec![],
            transcript: "t".into(),
            flashcards: vec![],
        }
    }

    #[test]
    fn lifecycle_moves_forward() {
        let mut session = VideoSession::new("vid");
        assert_eq!(session.status, SessionStatus::Registered);

        session.record(Artifact::Summary("s".into())).unwrap();
        assert_eq!(session.status, SessionStatus::PartiallyGenerated);
        assert_eq!(session.drafts.summary.as_deref(), Some("s"));

        let mut course = complete_course("vid");
        course.engagement = vec![EngagementEvent {
            emotion: crate::types::Emotion::Happy,
            engagement_level: 7,
            description: "d".into(),
            reason: "r".into(),
            timestamp: 3.0,
        }];
        session.publish(course).unwrap();
        assert_eq!(session.status, SessionStatus::Published);
        assert!(session.published_at.is_some());

        // drafts keep changing without touching the published course
        session.record(Artifact::Summary("newer".into())).unwrap();
        assert_eq!(session.status, SessionStatus::Published);
        assert_eq!(session.course.as_ref().unwrap().summary, "An intro to limits.");
    }

    #[test]
    fn incomplete_courses_cannot_be_published() {
        let mut session = VideoSession::new("vid");
        let err = session.publish(complete_course("vid")).unwrap_err();
        assert_matches!(err, LecternError::InvalidRequest(msg) if msg == "engagement are required");
        assert_eq!(session.status, SessionStatus::Registered);
    }

    #[test]
    fn student_artifacts_are_not_recorded_on_videos() {
        let mut session = VideoSession::new("vid");
        assert!(session.record(Artifact::ConceptMastery(vec![])).is_err());
    }

    #[test]
    fn wrong_answers_append_per_video() {
        let mut record = StudentRecord::new("ada");
        let wrong = |q: &str| WrongAnswer {
            question: q.into(),
            selected_answer: "x".into(),
            correct_answer: "y".into(),
            chapter_id: 1,
        };
        record.add_wrong_answer("v1", wrong("q1"));
        record.add_wrong_answer("v1", wrong("q2"));
        record.add_wrong_answer("v2", wrong("q3"));

        assert_eq!(record.wrong_answers("v1").len(), 2);
        assert_eq!(record.wrong_answers("v2")[0].question, "q3");
        assert!(record.wrong_answers("v3").is_empty());
    }

    #[test]
    fn course_reads_numeric_strings() {
        let course: Course = serde_json::from_value(json!({
            "video_id": "v",
            "chapters": [{
                "title": "t", "summary": "s",
                "start_time": "0", "end_time": "12.5", "chapter_id": "1"
            }]
        }))
        .unwrap();
        assert_eq!(course.chapters[0].end_time, 12.5);
        assert!(course.missing_fields().contains(&"title"));
    }
}
