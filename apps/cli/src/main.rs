use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use lectern_core::{
    ArtifactKind, Config, Course, CourseAnalysis, Envelope, EventStatus, FileStore,
    GenerationRequest, LectureService, ProgressReport, WrongAnswer,
    format_course_analysis_readable, format_course_readable, format_progress_readable,
};

fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Turn lecture videos into chapters, quizzes and study reports")]
struct Cli {
    /// Video provider: twelvelabs, google or aws
    #[arg(short, long, global = true, default_value = "twelvelabs", env = "LECTERN_PROVIDER")]
    provider: String,

    /// Print raw response envelopes instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Where sessions and student records are kept
    #[arg(long, global = true, env = "LECTERN_STORE_DIR")]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an uploaded video
    Register { video_id: String },
    /// Quick title, hashtags and topics for a video
    Gist { video_id: String },
    /// Generate one artifact (summary, chapters, quiz_questions, ...)
    Generate {
        kind: ArtifactKind,
        video_id: String,
        /// JSON file with the chapters to build on; defaults to chapters generated earlier
        #[arg(long)]
        chapters: Option<PathBuf>,
    },
    /// Stream summary, chapters, takeaways and pacing concurrently
    Analyze { video_id: String },
    /// Publish a course from a JSON file, or from everything generated so far
    Publish {
        video_id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List published courses
    Courses,
    /// Show a published course
    Course { video_id: String },
    /// Record a student reaction (plain text or JSON)
    React { video_id: String, reaction: String },
    /// List reactions for a video
    Reactions { video_id: String },
    /// Record a quiz answer a student got wrong
    WrongAnswer {
        student: String,
        video_id: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        selected: String,
        #[arg(long, default_value = "")]
        correct: String,
        #[arg(long)]
        chapter: u32,
    },
    /// Score a student's quiz and suggest what to study next
    Score { student: String, video_id: String },
    /// Instructor report across every student of a course
    CourseAnalysis { video_id: String },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Run one service call behind a spinner unless output is machine-readable.
async fn with_spinner<F>(json: bool, msg: &str, call: F) -> Envelope
where
    F: Future<Output = Envelope>,
{
    if json {
        return call.await;
    }
    let spinner = create_spinner(msg);
    let envelope = call.await;
    spinner.finish_and_clear();
    envelope
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lectern=info,lectern_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.store_dir.clone() {
        config.store_dir = dir;
    }
    let store = FileStore::open(&config.store_dir)
        .await
        .with_context(|| format!("cannot open store at {}", config.store_dir.display()))?;
    let service = LectureService::from_config(&config, Arc::new(store));

    if !cli.json {
        let available: Vec<&str> = service
            .providers()
            .available()
            .iter()
            .map(|k| k.as_str())
            .collect();
        println!(
            "\n{}  {}  {}\n",
            style("lectern").cyan().bold(),
            style("Lecture Analyzer").dim(),
            style(format!("[providers: {}]", available.join(", "))).dim()
        );
    }

    let provider = cli.provider.as_str();
    let envelope = match cli.command {
        Command::Register { video_id } => service.register_video(&video_id).await,
        Command::Gist { video_id } => {
            let call = service.cached_analysis(&video_id, provider);
            with_spinner(cli.json, "Looking at the video...", call).await
        }
        Command::Generate {
            kind,
            video_id,
            chapters,
        } => {
            let chapters = match chapters {
                Some(path) => Some(read_json(&path).await?),
                None => None,
            };
            let request = GenerationRequest {
                video_id,
                provider: provider.to_string(),
                chapters,
            };
            let msg = format!("Generating {kind}...");
            with_spinner(cli.json, &msg, service.generate(kind, request)).await
        }
        Command::Analyze { video_id } => {
            return analyze(&service, &video_id, provider, cli.json).await;
        }
        Command::Publish { video_id, file } => match file {
            Some(path) => {
                let mut course: Course = serde_json::from_value(read_json(&path).await?)
                    .with_context(|| format!("{} is not a course", path.display()))?;
                if course.video_id.is_empty() {
                    course.video_id = video_id;
                }
                service.publish_course(course).await
            }
            None => service.publish_drafts(&video_id).await,
        },
        Command::Courses => service.published_courses().await,
        Command::Course { video_id } => service.course_metadata(&video_id).await,
        Command::React { video_id, reaction } => {
            let reaction = serde_json::from_str(&reaction).unwrap_or(Value::String(reaction));
            service.save_reaction(&video_id, reaction).await
        }
        Command::Reactions { video_id } => service.reactions(&video_id).await,
        Command::WrongAnswer {
            student,
            video_id,
            question,
            selected,
            correct,
            chapter,
        } => {
            let answer = WrongAnswer {
                question,
                selected_answer: selected,
                correct_answer: correct,
                chapter_id: chapter,
            };
            service.save_wrong_answer(&student, &video_id, answer).await
        }
        Command::Score { student, video_id } => {
            let call = service.score_quiz(&student, &video_id, provider);
            let envelope = with_spinner(cli.json, "Scoring quiz...", call).await;
            // the report is saved in the background
            tokio::time::sleep(Duration::from_millis(200)).await;
            envelope
        }
        Command::CourseAnalysis { video_id } => {
            let call = service.course_analysis(&video_id, provider);
            with_spinner(cli.json, "Analysing course...", call).await
        }
    };

    let ok = envelope.is_success();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_envelope(&envelope)?;
    }
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn read_json(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

async fn analyze(
    service: &LectureService,
    video_id: &str,
    provider: &str,
    json: bool,
) -> Result<()> {
    let mut events = service.analyze_lecture(video_id, provider);
    let mut failed = false;

    while let Some(event) = events.next().await {
        if event.status == EventStatus::Error {
            failed = true;
        }
        if json {
            println!("{}", event.to_data_line()?);
            continue;
        }
        match event.status {
            EventStatus::InProgress => {
                if let Some(content) = &event.content {
                    println!("{} {}", style(format!("[{}]", event.tag)).dim(), content.trim_end());
                }
            }
            EventStatus::Complete => println!("{} {}", style("✓").green().bold(), event.tag),
            EventStatus::Error => println!(
                "{} {}: {}",
                style("✗").red().bold(),
                event.tag,
                event.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_envelope(envelope: &Envelope) -> Result<()> {
    match envelope {
        Envelope::Error { kind, code, message } => {
            eprintln!(
                "{} {} ({}): {}",
                style("Error:").red().bold(),
                kind,
                style(code).dim(),
                message
            );
        }
        Envelope::Success {
            kind, duration, data, ..
        } => {
            println!(
                "{} {} {}",
                style("✓").green().bold(),
                kind,
                style(format!("[{}]", format_duration(*duration))).dim()
            );
            println!("{}", style("─".repeat(60)).dim());
            println!("{}", render(kind, data)?);
        }
    }
    Ok(())
}

fn render(kind: &str, data: &Value) -> Result<String> {
    let text = match kind {
        "course_metadata" => {
            format_course_readable(&serde_json::from_value::<Course>(data.clone())?)
        }
        "quiz_performance" => {
            format_progress_readable(&serde_json::from_value::<ProgressReport>(data.clone())?)
        }
        "course_analysis" => {
            let analysis: CourseAnalysis = serde_json::from_value(data.clone())?;
            format_course_analysis_readable(&analysis)
        }
        "published_courses" => {
            let courses: Vec<Course> = serde_json::from_value(data.clone())?;
            if courses.is_empty() {
                "No published courses yet.".to_string()
            } else {
                courses
                    .iter()
                    .map(|c| {
                        let id = style(format!("({})", c.video_id)).dim();
                        format!("• {} {}", c.title, id)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        _ => match data {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other)?,
        },
    };
    Ok(text)
}
