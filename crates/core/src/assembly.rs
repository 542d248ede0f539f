//! Aggregates generated artifacts with student results into reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    decimal::lenient,
    error::{LecternError, Result},
    pipeline::ArtifactPipeline,
    prompts::QuizAttempt,
    provider::VideoProvider,
    schema::ArtifactKind,
    session::{Course, StudentRecord},
    types::{
        Chapter, ConceptMastery, CourseAnalysis, QuizQuestion, StudyRecommendation, WrongAnswer,
    },
};

/// A student's quiz results for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Share of the quiz answered wrongly: `wrong_answer_count / total_questions`.
    #[serde(deserialize_with = "lenient::f64")]
    pub accuracy: f64,
    #[serde(deserialize_with = "lenient::u32")]
    pub total_questions: u32,
    #[serde(deserialize_with = "lenient::u32")]
    pub wrong_answer_count: u32,
    pub question_by_chapters: BTreeMap<u32, Vec<QuizQuestion>>,
    pub study_recommendations: Vec<StudyRecommendation>,
    pub concept_mastery: Vec<ConceptMastery>,
}

/// Every chapter gets an entry, even without questions.
pub fn group_questions_by_chapter(
    chapters: &[Chapter],
    questions: &[QuizQuestion],
) -> BTreeMap<u32, Vec<QuizQuestion>> {
    let mut grouped: BTreeMap<u32, Vec<QuizQuestion>> = chapters
        .iter()
        .map(|c| (c.chapter_id, Vec::new()))
        .collect();
    for question in questions {
        grouped.entry(question.chapter_id).or_default().push(question.clone());
    }
    grouped
}

pub async fn calculate_quiz_performance(
    pipeline: &ArtifactPipeline,
    provider: &dyn VideoProvider,
    course: &Course,
    wrong_answers: &[WrongAnswer],
) -> Result<ProgressReport> {
    let total_questions = course.quiz_questions.len();
    if total_questions == 0 {
        return Err(LecternError::MissingDependency {
            artifact: ArtifactKind::StudyRecommendations,
            dependency: "quiz_questions",
        });
    }

    let attempt = QuizAttempt {
        chapters: &course.chapters,
        questions: &course.quiz_questions,
        transcript: &course.transcript,
        wrong_answers,
    };
    let (study_recommendations, concept_mastery) = tokio::try_join!(
        pipeline.generate_study_recommendations(provider, &course.video_id, &attempt),
        pipeline.generate_concept_mastery(provider, &course.video_id, &attempt),
    )?;

    let report = ProgressReport {
        accuracy: wrong_answers.len() as f64 / total_questions as f64,
        total_questions: total_questions as u32,
        wrong_answer_count: wrong_answers.len() as u32,
        question_by_chapters: group_questions_by_chapter(&course.chapters, &course.quiz_questions),
        study_recommendations,
        concept_mastery,
    };

    info!(
        video_id = %course.video_id,
        total_questions = report.total_questions,
        wrong_answers = report.wrong_answer_count,
        "Quiz performance calculated"
    );
    Ok(report)
}

/// Instructor-facing analysis across every student who took the course's quiz.
pub async fn generate_course_analysis(
    pipeline: &ArtifactPipeline,
    provider: &dyn VideoProvider,
    course: &Course,
    students: &[StudentRecord],
) -> Result<CourseAnalysis> {
    let student_data: Vec<_> = students
        .iter()
        .filter_map(|record| {
            let video = record.videos.get(&course.video_id)?;
            Some(json!({
                "student_name": record.student_name,
                "wrong_answers": video.wrong_answers,
                "progress_report": video.progress_report.as_ref().map(|r| json!({
                    "accuracy": r.accuracy,
                    "total_questions": r.total_questions,
                    "concept_mastery": r.concept_mastery,
                })),
            }))
        })
        .collect();

    if student_data.is_empty() {
        return Err(LecternError::MissingDependency {
            artifact: ArtifactKind::CourseAnalysis,
            dependency: "student results",
        });
    }

    pipeline
        .generate_course_analysis(
            provider,
            &course.video_id,
            &course.chapters,
            &json!(student_data),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(chapter_id: u32) -> QuizQuestion {
        QuizQuestion {
            question: format!("question for {chapter_id}"),
            answer: "a".into(),
            wrong_answers: vec!["b".into()],
            chapter_id,
            answer_explanation: String::new(),
            hint: String::new(),
        }
    }

    fn chapter(chapter_id: u32) -> Chapter {
        Chapter {
            title: format!("Chapter {chapter_id}"),
            summary: "s".into(),
            start_time: 0.0,
            end_time: 1.0,
            chapter_id,
        }
    }

    #[test]
    fn questions_group_under_every_chapter() {
        let grouped = group_questions_by_chapter(
            &[chapter(1), chapter(2), chapter(3)],
            &[question(1), question(1), question(3)],
        );

        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(grouped[&1].len(), 2);
        assert!(grouped[&2].is_empty());
    }

    #[test]
    fn progress_report_reads_stringified_numbers() {
        let report: ProgressReport = serde_json::from_value(json!({
            "accuracy": "0.25",
            "total_questions": "4",
            "wrong_answer_count": "1",
            "question_by_chapters": {"1": []},
            "study_recommendations": [],
            "concept_mastery": []
        }))
        .unwrap();
        assert_eq!(report.accuracy, 0.25);
        assert!(report.question_by_chapters.contains_key(&1));
    }
}
