use serde::{Deserialize, Serialize};

use crate::decimal::lenient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub summary: String,
    #[serde(deserialize_with = "lenient::f64")]
    pub start_time: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub end_time: f64,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub chapter_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingRecommendation {
    #[serde(deserialize_with = "lenient::f64")]
    pub start_time: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub end_time: f64,
    pub recommendation: String,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
    pub wrong_answers: Vec<String>,
    #[serde(deserialize_with = "lenient::u32")]
    pub chapter_id: u32,
    #[serde(default)]
    pub answer_explanation: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub concept: String,
    pub definition: String,
    #[serde(deserialize_with = "lenient::u32")]
    pub chapter_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Confused,
    Bored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub emotion: Emotion,
    #[serde(deserialize_with = "lenient::i64")]
    pub engagement_level: i64,
    pub description: String,
    pub reason: String,
    /// Seconds from the start of the video.
    #[serde(deserialize_with = "lenient::f64")]
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecommendation {
    pub priority: String,
    pub time_to_review: String,
    pub title: String,
    pub description: String,
    #[serde(default, deserialize_with = "lenient::u32_vec")]
    pub recommended_chapters: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMastery {
    pub concept: String,
    #[serde(deserialize_with = "lenient::i64")]
    pub mastery_level: i64,
    pub chapter_title: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAnalysis {
    pub overview: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvement_areas: Vec<String>,
    #[serde(default)]
    pub struggling_concepts: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Quick provider-computed metadata for a video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Gist {
    pub title: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// A quiz answer a student got wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrongAnswer {
    pub question: String,
    #[serde(alias = "wrong_answer")]
    pub selected_answer: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(deserialize_with = "lenient::u32")]
    pub chapter_id: u32,
}
