//! Concurrent streaming analysis: several prompts run against one video at
//! once and their chunks are fanned into a single tagged event stream.

use std::{collections::BTreeSet, sync::Arc};

use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    config::DEFAULT_STREAM_BUFFER,
    error::{LecternError, Result},
    prompts,
    provider::VideoProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    InProgress,
    Complete,
    Error,
}

/// One item of the fan-in stream. `complete` and `error` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEvent {
    pub fn chunk(tag: &str, content: String) -> Self {
        Self {
            tag: tag.to_string(),
            content: Some(content),
            status: EventStatus::InProgress,
            error: None,
        }
    }

    pub fn complete(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            content: None,
            status: EventStatus::Complete,
            error: None,
        }
    }

    pub fn error(tag: &str, message: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            content: None,
            status: EventStatus::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != EventStatus::InProgress
    }

    /// Server-sent-events framing: `data: {json}`.
    pub fn to_data_line(&self) -> Result<String> {
        Ok(format!("data: {}", serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTask {
    pub tag: String,
    pub prompt: String,
}

impl StreamTask {
    pub fn new(tag: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            prompt: prompt.into(),
        }
    }
}

/// The streamed lecture analysis shown while a course is being built.
pub fn lecture_tasks() -> Vec<StreamTask> {
    vec![
        StreamTask::new("summary", prompts::STREAM_SUMMARY_PROMPT),
        StreamTask::new("chapter", prompts::chapters()),
        StreamTask::new("key_takeaways", prompts::key_takeaways()),
        StreamTask::new("pacing_recommendations", prompts::pacing_recommendations()),
    ]
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    buffer: usize,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_BUFFER)
    }
}

impl Orchestrator {
    pub fn new(buffer: usize) -> Self {
        Self { buffer: buffer.max(1) }
    }

    /// Start every task and return the merged event stream. Each tag yields
    /// its chunks in order followed by exactly one terminal event; the stream
    /// ends once every tag has terminated. Dropping the stream aborts any
    /// task still running.
    pub fn run(
        &self,
        provider: Arc<dyn VideoProvider>,
        video_id: &str,
        tasks: Vec<StreamTask>,
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let mut pending = BTreeSet::new();
        for task in &tasks {
            if !pending.insert(task.tag.clone()) {
                return Err(LecternError::InvalidRequest(format!(
                    "duplicate stream tag: {}",
                    task.tag
                )));
            }
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("stream_run", %run_id, video_id, provider = %provider.kind());
        info!(parent: &span, tasks = pending.len(), "Starting streamed analysis");

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(self.buffer);
        let mut workers = JoinSet::new();
        for task in tasks {
            let provider = Arc::clone(&provider);
            let video_id = video_id.to_string();
            let tx = tx.clone();
            let task_span = info_span!(parent: &span, "stream_task", tag = %task.tag);
            workers.spawn(stream_task(provider, video_id, task, tx).instrument(task_span));
        }
        drop(tx);

        let stream = async_stream::stream! {
            // held for the lifetime of the stream; dropping it aborts the workers
            let _workers = workers;

            while !pending.is_empty() {
                let Some(event) = rx.recv().await else {
                    break;
                };
                if event.is_terminal() {
                    pending.remove(&event.tag);
                }
                yield event;
            }

            for tag in std::mem::take(&mut pending) {
                warn!(parent: &span, tag = %tag, "Task ended without a terminal event");
                yield StreamEvent::error(&tag, "task ended unexpectedly");
            }

            info!(parent: &span, "Streamed analysis finished");
        };

        Ok(stream.boxed())
    }
}

async fn stream_task(
    provider: Arc<dyn VideoProvider>,
    video_id: String,
    task: StreamTask,
    tx: mpsc::Sender<StreamEvent>,
) {
    let terminal = match provider.analyze_stream(&video_id, &task.prompt).await {
        Ok(mut chunks) => loop {
            match chunks.next().await {
                Some(Ok(text)) => {
                    if tx.send(StreamEvent::chunk(&task.tag, text)).await.is_err() {
                        debug!("Consumer went away");
                        return;
                    }
                }
                Some(Err(e)) => break StreamEvent::error(&task.tag, e.to_string()),
                None => break StreamEvent::complete(&task.tag),
            }
        },
        Err(e) => StreamEvent::error(&task.tag, e.to_string()),
    };

    if let Some(error) = &terminal.error {
        warn!(error = %error, "Stream task failed");
    }
    let _ = tx.send(terminal).await;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::{
        error::{ProviderCause, ProviderError},
        provider::{ProviderKind, TextStream},
        types::Gist,
    };

    /// Streams the words of the prompt; prompts starting with "fail" error
    /// mid-stream and "refuse" fails before streaming.
    struct Echo;

    #[async_trait]
    impl VideoProvider for Echo {
        fn kind(&self) -> ProviderKind {
            ProviderKind::TwelveLabs
        }

        async fn analyze(
            &self,
            _video_id: &str,
            prompt: &str,
        ) -> std::result::Result<String, ProviderError> {
            Ok(prompt.to_string())
        }

        async fn analyze_stream(
            &self,
            _video_id: &str,
            prompt: &str,
        ) -> std::result::Result<TextStream, ProviderError> {
            let failure = |reason: &str| {
                ProviderError::new(ProviderKind::TwelveLabs, ProviderCause::Other(reason.into()))
            };
            if prompt.starts_with("refuse") {
                return Err(failure("quota"));
            }
            let mut items: Vec<std::result::Result<String, ProviderError>> =
                prompt.split_whitespace().map(|w| Ok(w.to_string())).collect();
            if prompt.starts_with("fail") {
                items.push(Err(failure("dropped")));
            }
            Ok(stream::iter(items).boxed())
        }

        async fn gist(&self, _video_id: &str) -> std::result::Result<Gist, ProviderError> {
            Ok(Gist::default())
        }
    }

    async fn collect(tasks: Vec<StreamTask>) -> Vec<StreamEvent> {
        Orchestrator::new(2)
            .run(Arc::new(Echo), "video", tasks)
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn every_tag_gets_exactly_one_terminal_event() {
        let events = collect(vec![
            StreamTask::new("summary", "a short summary"),
            StreamTask::new("chapter", "fail after two"),
            StreamTask::new("key_takeaways", "refuse"),
            StreamTask::new("pacing_recommendations", "slow down"),
        ])
        .await;

        let mut terminals: BTreeMap<&str, Vec<EventStatus>> = BTreeMap::new();
        for event in events.iter().filter(|e| e.is_terminal()) {
            terminals.entry(event.tag.as_str()).or_default().push(event.status);
        }

        assert_eq!(terminals.len(), 4);
        assert_eq!(terminals["summary"], vec![EventStatus::Complete]);
        assert_eq!(terminals["chapter"], vec![EventStatus::Error]);
        assert_eq!(terminals["key_takeaways"], vec![EventStatus::Error]);
        assert_eq!(terminals["pacing_recommendations"], vec![EventStatus::Complete]);

        // nothing follows a tag's terminal event
        for (tag, _) in terminals {
            let last = events.iter().rposition(|e| e.tag == tag).unwrap();
            assert!(events[last].is_terminal());
        }
    }

    #[tokio::test]
    async fn chunks_keep_their_order_per_tag() {
        let events = collect(vec![
            StreamTask::new("summary", "one two three four"),
            StreamTask::new("chapter", "alpha beta gamma"),
        ])
        .await;

        let words = |tag: &str| -> Vec<String> {
            events
                .iter()
                .filter(|e| e.tag == tag)
                .filter_map(|e| e.content.clone())
                .collect()
        };
        assert_eq!(words("summary"), vec!["one", "two", "three", "four"]);
        assert_eq!(words("chapter"), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let result = Orchestrator::default().run(
            Arc::new(Echo),
            "video",
            vec![StreamTask::new("summary", "a"), StreamTask::new("summary", "b")],
        );
        assert_matches!(result.err(), Some(LecternError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn no_tasks_means_an_empty_stream() {
        assert!(collect(Vec::new()).await.is_empty());
    }

    #[test]
    fn events_serialize_like_sse_payloads() {
        let line = StreamEvent::chunk("summary", "Hi".into()).to_data_line().unwrap();
        assert_eq!(line, r#"data: {"type":"summary","content":"Hi","status":"in_progress"}"#);

        let error = serde_json::to_value(StreamEvent::error("chapter", "boom")).unwrap();
        assert_eq!(error["status"], "error");
        assert_eq!(error["error"], "boom");
    }

    #[test]
    fn default_lecture_tasks() {
        let tags: Vec<_> = lecture_tasks().into_iter().map(|t| t.tag).collect();
        assert_eq!(tags, vec!["summary", "chapter", "key_takeaways", "pacing_recommendations"]);
    }
}
