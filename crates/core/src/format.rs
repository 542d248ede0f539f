use crate::{
    assembly::ProgressReport,
    session::Course,
    types::{Chapter, CourseAnalysis},
};

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

fn push_chapters(output: &mut String, chapters: &[Chapter]) {
    for chapter in chapters {
        let start = format_timestamp(chapter.start_time);
        let end = format_timestamp(chapter.end_time);
        output.push_str(&format!(
            "### {}. [{}–{}] {}\n\n",
            chapter.chapter_id, start, end, chapter.title
        ));
        output.push_str(&format!("{}\n\n", chapter.summary));
    }
}

pub fn format_course_readable(course: &Course) -> String {
    let mut output = String::new();
    output.push_str(&format!("# {}\n\n", course.title));
    output.push_str(&format!(
        "**Video:** {} | **Chapters:** {} | **Quiz questions:** {}\n\n",
        course.video_id,
        course.chapters.len(),
        course.quiz_questions.len()
    ));

    output.push_str("## Summary\n\n");
    output.push_str(&course.summary);
    output.push_str("\n\n");

    output.push_str("## Key takeaways\n\n");
    for takeaway in &course.key_takeaways {
        output.push_str(&format!("• {}\n", takeaway));
    }
    output.push('\n');

    output.push_str("## Chapters\n\n");
    push_chapters(&mut output, &course.chapters);

    if !course.pacing_recommendations.is_empty() {
        output.push_str("## Pacing\n\n");
        for rec in &course.pacing_recommendations {
            output.push_str(&format!(
                "• [{}–{}] ({}) {}\n",
                format_timestamp(rec.start_time),
                format_timestamp(rec.end_time),
                rec.severity,
                rec.recommendation
            ));
        }
        output.push('\n');
    }

    output
}

pub fn format_progress_readable(report: &ProgressReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "**Wrong answers:** {} of {} ({:.0}%)\n\n",
        report.wrong_answer_count,
        report.total_questions,
        report.accuracy * 100.0
    ));

    output.push_str("## Questions by chapter\n\n");
    for (chapter_id, questions) in &report.question_by_chapters {
        output.push_str(&format!("• Chapter {}: {} questions\n", chapter_id, questions.len()));
    }
    output.push('\n');

    output.push_str("## Study next\n\n");
    for rec in &report.study_recommendations {
        output.push_str(&format!(
            "• [{}] {} ({})\n  {}\n",
            rec.priority, rec.title, rec.time_to_review, rec.description
        ));
    }
    output.push('\n');

    output.push_str("## Concept mastery\n\n");
    for item in &report.concept_mastery {
        output.push_str(&format!("• {}: {}/10\n", item.concept, item.mastery_level));
    }

    output
}

pub fn format_course_analysis_readable(analysis: &CourseAnalysis) -> String {
    let mut output = String::new();
    output.push_str("## Overview\n\n");
    output.push_str(&analysis.overview);
    output.push_str("\n\n");

    for (heading, items) in [
        ("Strengths", &analysis.strengths),
        ("Improvement areas", &analysis.improvement_areas),
        ("Struggling concepts", &analysis.struggling_concepts),
        ("Recommendations", &analysis.recommendations),
    ] {
        if items.is_empty() {
            continue;
        }
        output.push_str(&format!("## {}\n\n", heading));
        for item in items {
            output.push_str(&format!("• {}\n", item));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3600.0), "60:00");
    }

    #[test]
    fn course_lists_chapters_with_times() {
        let course = Course {
            video_id: "v".into(),
            title: "Limits".into(),
            chapters: vec![Chapter {
                title: "Intro".into(),
                summary: "Why limits matter".into(),
                start_time: 0.0,
                end_time: 90.0,
                chapter_id: 1,
            }],
            ..Course::default()
        };

        let text = format_course_readable(&course);
        assert!(text.starts_with("# Limits\n"));
        assert!(text.contains("### 1. [00:00–01:30] Intro"));
    }
}
