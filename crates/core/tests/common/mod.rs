#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::{Value, json};

use lectern_core::{
    ArtifactKind, ArtifactPipeline, Chapter, DocumentStore, Gist, LectureService, MemoryStore,
    Orchestrator, ProviderCause, ProviderError, ProviderKind, ProviderRegistry, QuizQuestion,
    RepairFailure, Reformatter, SchemaDescriptor, TextStream, VideoProvider,
};

/// Answers each prompt with the reply registered for the schema it asks for.
pub struct ScriptedProvider {
    kind: ProviderKind,
    replies: Vec<(String, String)>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            replies: Vec::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, kind: ArtifactKind, text: impl Into<String>) -> Self {
        // `{"summary": string}` -> `{"summary"`
        let shape = SchemaDescriptor::for_kind(kind).shape;
        let needle = shape.split(':').next().unwrap_or(shape).to_string();
        self.replies.push((needle, text.into()));
        self
    }

    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn answer(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                ProviderError::new(self.kind, ProviderCause::Other("no scripted reply".into()))
            })
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn analyze(&self, _video_id: &str, prompt: &str) -> Result<String, ProviderError> {
        self.answer(prompt)
    }

    async fn analyze_stream(
        &self,
        _video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError> {
        let text = self.answer(prompt)?;
        let chunks: Vec<Result<String, ProviderError>> =
            text.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn gist(&self, _video_id: &str) -> Result<Gist, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Gist {
            title: "Introduction to Limits".into(),
            hashtags: vec!["#calculus".into()],
            topics: vec!["limits".into(), "continuity".into()],
        })
    }
}

/// Hands out queued values; an empty queue is a repair failure.
#[derive(Default)]
pub struct ScriptedReformatter {
    replies: Mutex<VecDeque<Value>>,
    calls: AtomicUsize,
}

impl ScriptedReformatter {
    pub fn returning(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            replies: Mutex::new(values.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reformatter for ScriptedReformatter {
    async fn reformat(
        &self,
        _raw: &str,
        descriptor: &SchemaDescriptor,
    ) -> Result<Value, RepairFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RepairFailure::new(descriptor.kind, "model unavailable"))
    }
}

pub fn pipeline(reformatter: &Arc<ScriptedReformatter>) -> ArtifactPipeline {
    ArtifactPipeline::new(Arc::clone(reformatter) as Arc<dyn Reformatter>)
}

pub fn service(
    provider: &Arc<ScriptedProvider>,
    reformatter: &Arc<ScriptedReformatter>,
) -> LectureService {
    service_with_store(provider, reformatter, Arc::new(MemoryStore::new()))
}

pub fn service_with_store(
    provider: &Arc<ScriptedProvider>,
    reformatter: &Arc<ScriptedReformatter>,
    store: Arc<dyn DocumentStore>,
) -> LectureService {
    let registry =
        ProviderRegistry::new(4).with_provider(Arc::clone(provider) as Arc<dyn VideoProvider>);
    LectureService::new(
        registry,
        Arc::clone(reformatter) as Arc<dyn Reformatter>,
        Orchestrator::new(8),
        store,
    )
}

pub fn chapter(chapter_id: u32, start: f64, end: f64) -> Chapter {
    Chapter {
        title: format!("Chapter {chapter_id}"),
        summary: format!("What chapter {chapter_id} covers"),
        start_time: start,
        end_time: end,
        chapter_id,
    }
}

pub fn question(chapter_id: u32, text: &str) -> QuizQuestion {
    QuizQuestion {
        question: text.into(),
        answer: "right".into(),
        wrong_answers: vec!["wrong".into(), "also wrong".into()],
        chapter_id,
        answer_explanation: "because".into(),
        hint: "think".into(),
    }
}

pub fn chapters_reply() -> String {
    json!({"chapters": [
        {
            "title": "Continuity", "summary": "When functions are continuous",
            "start_time": 120, "end_time": 300, "chapter_id": 5
        },
        {
            "title": "Limits", "summary": "What a limit is",
            "start_time": 0, "end_time": 120, "chapter_id": 9
        }
    ]})
    .to_string()
}

pub fn quiz_reply() -> String {
    json!({"quiz_questions": [
        {
            "question": "What is a limit?", "answer": "A value approached",
            "wrong_answers": ["A derivative"], "chapter_id": 1
        },
        {
            "question": "Define continuity", "answer": "No jumps",
            "wrong_answers": ["Has a hole"], "chapter_id": 2
        }
    ]})
    .to_string()
}

pub fn study_reply() -> String {
    json!({"study_recommendations": [
        {
            "priority": "high", "time_to_review": "15 minutes", "title": "Revisit limits",
            "description": "Rewatch chapter 1", "recommended_chapters": [1]
        }
    ]})
    .to_string()
}

pub fn mastery_reply() -> String {
    json!({"concept_mastery": [
        {
            "concept": "Limits", "mastery_level": 4,
            "chapter_title": "Limits", "reasoning": "Missed the definition"
        }
    ]})
    .to_string()
}

pub fn engagement_reply() -> String {
    json!({"engagement": [
        {
            "emotion": "confused", "engagement_level": 4, "description": "Epsilon-delta",
            "reason": "Dense notation", "timestamp": 95.5
        }
    ]})
    .to_string()
}
