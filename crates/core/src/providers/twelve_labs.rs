use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{ProviderCause, ProviderError},
    provider::{ProviderKind, TextStream, VideoProvider},
    providers::{body_lines, check_status},
    types::Gist,
};

const KIND: ProviderKind = ProviderKind::TwelveLabs;

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeStreamEvent {
    event_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    hashtags: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
}

/// TwelveLabs Pegasus: videos are referenced by their indexed video id.
pub struct TwelveLabsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TwelveLabsProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: KIND.config().api_url.to_string(),
        }
    }

    async fn post_analyze(
        &self,
        video_id: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderCause> {
        debug!(video_id, stream, "TwelveLabs analyze");
        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({
                "video_id": video_id,
                "prompt": prompt,
                "temperature": 0.2,
                "stream": stream,
            }))
            .send()
            .await?;

        check_status(response).await
    }

    async fn fetch_gist(&self, video_id: &str) -> Result<Gist, ProviderCause> {
        let response = self
            .client
            .post(format!("{}/gist", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({
                "video_id": video_id,
                "types": ["title", "hashtag", "topic"],
            }))
            .send()
            .await?;

        let gist = check_status(response).await?.json::<GistResponse>().await?;
        Ok(Gist {
            title: gist.title.unwrap_or_default(),
            hashtags: gist.hashtags,
            topics: gist.topics,
        })
    }
}

/// Pull generated text out of one NDJSON line; lifecycle events carry none.
fn stream_text(line: &str) -> Result<Option<String>, ProviderCause> {
    let event: AnalyzeStreamEvent = serde_json::from_str(line)?;
    match event.event_type.as_str() {
        "text_generation" => Ok(event.text),
        "error" => Err(ProviderCause::InvalidResponse(line.to_string())),
        _ => Ok(None),
    }
}

fn generated_text(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static {
    async_stream::try_stream! {
        let mut lines = Box::pin(body_lines(response));
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| ProviderError::new(KIND, e))?;
            if let Some(text) = stream_text(&line).map_err(|e| ProviderError::new(KIND, e))? {
                yield text;
            }
        }
    }
}

#[async_trait]
impl VideoProvider for TwelveLabsProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn analyze(&self, video_id: &str, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .post_analyze(video_id, prompt, false)
            .await
            .map_err(|e| ProviderError::new(KIND, e))?;

        let body = response
            .json::<AnalyzeResponse>()
            .await
            .map_err(|e| ProviderError::new(KIND, e))?;

        Ok(body.data)
    }

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError> {
        let response = self
            .post_analyze(video_id, prompt, true)
            .await
            .map_err(|e| ProviderError::new(KIND, e))?;

        Ok(generated_text(response).boxed())
    }

    async fn gist(&self, video_id: &str) -> Result<Gist, ProviderError> {
        self.fetch_gist(video_id)
            .await
            .map_err(|e| ProviderError::new(KIND, e))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn stream_lines_yield_only_generated_text() {
        assert_eq!(stream_text(r#"{"event_type":"stream_start","metadata":{}}"#).unwrap(), None);
        assert_eq!(
            stream_text(r#"{"event_type":"text_generation","text":"Chapter 1"}"#).unwrap(),
            Some("Chapter 1".to_string())
        );
        assert_eq!(stream_text(r#"{"event_type":"stream_end"}"#).unwrap(), None);
    }

    #[test]
    fn stream_errors_surface() {
        assert_matches!(stream_text("not json"), Err(ProviderCause::Json(_)));
        assert_matches!(
            stream_text(r#"{"event_type":"error","message":"quota"}"#),
            Err(ProviderCause::InvalidResponse(_))
        );
    }
}
