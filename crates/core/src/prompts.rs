//! Prompt templates handed to video providers, one per artifact.

use crate::{
    schema::{ArtifactKind, MAX_CHAPTERS, MAX_ENGAGEMENT_EVENTS, SchemaDescriptor},
    types::{Chapter, QuizQuestion, WrongAnswer},
};

pub const MAX_PACING_RECOMMENDATIONS: usize = 7;
pub const MAX_QUESTIONS_PER_CHAPTER: usize = 4;

/// Short prose prompt used by the streamed lecture analysis.
pub const STREAM_SUMMARY_PROMPT: &str =
    "Summarize the video in less than 5 sentences for a student.";

fn with_schema(instructions: &str, kind: ArtifactKind) -> String {
    let descriptor = SchemaDescriptor::for_kind(kind);
    format!(
        "{instructions}\n\nRespond with JSON only, no preamble or postamble, matching:\n{}",
        descriptor.shape
    )
}

fn chapter_list_with_ids(chapters: &[Chapter]) -> String {
    chapters
        .iter()
        .map(|c| format!("[chapter_id {}] {}: {}", c.chapter_id, c.title, c.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary() -> String {
    with_schema(
        "Summarize the video in less than 5 sentences. Listen to the audio and summarize the \
         video in a way that is helpful for a student to understand the topic being discussed.",
        ArtifactKind::Summary,
    )
}

pub fn key_takeaways() -> String {
    with_schema(
        "Generate key takeaways from the video. They should be key definitions and bullet \
         points. Listen to the audio and generate key takeaways that help a student understand \
         the topic being discussed.",
        ArtifactKind::KeyTakeaways,
    )
}

pub fn pacing_recommendations() -> String {
    with_schema(
        &format!(
            "Generate pacing recommendations for the instructor of this video. Do NOT cover \
             every second of the video; point at the moments where the pace should change. \
             Keep the time ranges short and specific, in seconds. Limit to a maximum of \
             {MAX_PACING_RECOMMENDATIONS} recommendations. Severity is one of low, medium or high."
        ),
        ArtifactKind::PacingRecommendations,
    )
}

pub fn chapters() -> String {
    with_schema(
        &format!(
            "Generate chapters covering the detailed subtopics the instructor is teaching. Each \
             chapter summary should break the subtopic down into easy to understand instructions \
             and concepts. Give each chapter a concise title naming the topic and methodology. \
             Start and end times are in seconds. Limit to a maximum of {MAX_CHAPTERS} chapters."
        ),
        ArtifactKind::Chapters,
    )
}

pub fn quiz_questions(chapters: &[Chapter]) -> String {
    with_schema(
        &format!(
            "Generate quiz questions that help a student understand the topic being discussed.\n\n\
             Here are the chapters of the video:\n{}\n\n\
             Give at least 1 and at most {MAX_QUESTIONS_PER_CHAPTER} questions per chapter. Each \
             question must be educational rather than trivia. chapter_id must be one of the \
             chapter_id values listed above. Include a short answer_explanation and a hint.",
            chapter_list_with_ids(chapters)
        ),
        ArtifactKind::QuizQuestions,
    )
}

pub fn flashcards(chapters: &[Chapter]) -> String {
    with_schema(
        &format!(
            "Generate flashcards for the key concepts of the video, each with a concise \
             definition.\n\nHere are the chapters of the video:\n{}\n\n\
             chapter_id must be one of the chapter_id values listed above.",
            chapter_list_with_ids(chapters)
        ),
        ArtifactKind::Flashcards,
    )
}

pub fn engagement() -> String {
    with_schema(
        &format!(
            "Identify the moments where student engagement would change while watching this \
             lecture. For each, give the emotion a student would most likely feel, an engagement \
             level from 1 (lost) to 10 (fully engaged), what happens on screen, why it affects \
             engagement, and the timestamp in seconds. Limit to a maximum of \
             {MAX_ENGAGEMENT_EVENTS} moments."
        ),
        ArtifactKind::Engagement,
    )
}

pub fn transcript() -> String {
    with_schema(
        "Produce a multimodal transcript of the video: the spoken words, with important spoken \
         terms wrapped in [square brackets] and descriptions of what is shown on screen inline \
         in <angle brackets>.",
        ArtifactKind::Transcript,
    )
}

fn wrong_answer_lines(wrong_answers: &[WrongAnswer]) -> String {
    if wrong_answers.is_empty() {
        return "(none)".to_string();
    }
    wrong_answers
        .iter()
        .map(|w| {
            format!(
                "- [chapter_id {}] {} (answered: {}; correct: {})",
                w.chapter_id, w.question, w.selected_answer, w.correct_answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn question_lines(questions: &[QuizQuestion]) -> String {
    questions
        .iter()
        .map(|q| {
            format!(
                "- [chapter_id {}] {} (answer: {})",
                q.chapter_id, q.question, q.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// What a student saw and got wrong on one quiz.
#[derive(Debug, Clone, Copy)]
pub struct QuizAttempt<'a> {
    pub chapters: &'a [Chapter],
    pub questions: &'a [QuizQuestion],
    pub transcript: &'a str,
    pub wrong_answers: &'a [WrongAnswer],
}

impl QuizAttempt<'_> {
    fn describe(&self) -> String {
        format!(
            "Chapters:\n{}\n\nTranscript:\n{}\n\nThe full quiz ({} questions):\n{}\n\n\
             Questions they got wrong:\n{}",
            chapter_list_with_ids(self.chapters),
            self.transcript.trim(),
            self.questions.len(),
            question_lines(self.questions),
            wrong_answer_lines(self.wrong_answers)
        )
    }
}

pub fn study_recommendations(attempt: &QuizAttempt<'_>) -> String {
    with_schema(
        &format!(
            "A student took the quiz for this lecture. Recommend what they should review \
             next.\n\n{}\n\n\
             Priority is high, medium or low. recommended_chapters lists chapter ids from above.",
            attempt.describe()
        ),
        ArtifactKind::StudyRecommendations,
    )
}

pub fn concept_mastery(attempt: &QuizAttempt<'_>) -> String {
    with_schema(
        &format!(
            "Rate the student's mastery of each key concept of this lecture from 1 (not \
             understood) to 10 (mastered), based on the quiz results.\n\n{}",
            attempt.describe()
        ),
        ArtifactKind::ConceptMastery,
    )
}

pub fn course_analysis(chapters: &[Chapter], student_data: &str) -> String {
    with_schema(
        &format!(
            "Analyse how the students of this course are doing, for the instructor.\n\n\
             Chapters:\n{}\n\nStudent results (JSON):\n{}\n\n\
             Summarise overall performance, what the lecture does well, what should be \
             improved, and which concepts students struggle with.",
            chapter_list_with_ids(chapters),
            student_data
        ),
        ArtifactKind::CourseAnalysis,
    )
}
