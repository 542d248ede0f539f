pub mod assembly;
pub mod config;
pub mod decimal;
pub mod error;
pub mod format;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod repair;
pub mod schema;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

pub use assembly::{
    ProgressReport, calculate_quiz_performance, generate_course_analysis,
    group_questions_by_chapter,
};
pub use config::Config;
pub use error::{
    LecternError, ProviderCause, ProviderError, RepairFailure, Result, StoreError, ValidationError,
};
pub use format::{
    format_course_analysis_readable, format_course_readable, format_progress_readable,
    format_timestamp,
};
pub use orchestrator::{EventStatus, Orchestrator, StreamEvent, StreamTask, lecture_tasks};
pub use pipeline::{ArtifactPipeline, Generated};
pub use prompts::QuizAttempt;
pub use provider::{ProviderConfig, ProviderKind, ProviderRegistry, TextStream, VideoProvider};
pub use repair::{ChatReformatter, ReformatBackend, Reformatter};
pub use schema::{Artifact, ArtifactKind, ArtifactSchema, SchemaDescriptor, ValidationContext};
pub use service::{Envelope, GenerationRequest, LectureService};
pub use session::{Course, SessionStatus, StudentRecord, VideoSession};
pub use store::{DocumentStore, FileStore, MemoryStore};
pub use types::{
    Chapter, ConceptMastery, CourseAnalysis, Emotion, EngagementEvent, Flashcard, Gist,
    PacingRecommendation, QuizQuestion, StudyRecommendation, WrongAnswer,
};
