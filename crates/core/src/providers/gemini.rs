use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    error::{ProviderCause, ProviderError},
    provider::{ProviderKind, TextStream, VideoProvider},
    providers::{GIST_PROMPT, body_lines, check_status, parse_gist},
    types::Gist,
};

const KIND: ProviderKind = ProviderKind::Google;
const VIDEO_MIME_TYPE: &str = "video/mp4";

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// Gemini over the Generative Language API. The video id is the uploaded
/// file's name (`files/...`) or its full URI.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        let config = KIND.config();
        Self {
            client,
            api_key,
            base_url: config.api_url.to_string(),
            model: config.model.to_string(),
        }
    }

    fn file_uri(&self, video_id: &str) -> String {
        if video_id.starts_with("http://") || video_id.starts_with("https://") {
            video_id.to_string()
        } else if video_id.starts_with("files/") {
            format!("{}/{}", self.base_url, video_id)
        } else {
            format!("{}/files/{}", self.base_url, video_id)
        }
    }

    fn request_body(&self, video_id: &str, prompt: &str, json_output: bool) -> Value {
        let mut generation_config = json!({ "temperature": 0.2 });
        if json_output {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let file_data = json!({
            "mime_type": VIDEO_MIME_TYPE,
            "file_uri": self.file_uri(video_id),
        });
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "file_data": file_data },
                    { "text": prompt },
                ],
            }],
            "generationConfig": generation_config,
        })
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ProviderCause> {
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        check_status(response).await
    }

    async fn generate(
        &self,
        video_id: &str,
        prompt: &str,
        json_output: bool,
    ) -> Result<String, ProviderCause> {
        debug!(video_id, model = %self.model, "Gemini generateContent");
        let body = self.request_body(video_id, prompt, json_output);
        let response = self
            .post("generateContent", &body)
            .await?
            .json::<GenerateContentResponse>()
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(ProviderCause::InvalidResponse("response has no text candidates".into()));
        }
        Ok(text)
    }
}

/// Text carried by one server-sent `data:` line, if any.
fn sse_text(line: &str) -> Result<Option<String>, ProviderCause> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };

    let chunk: GenerateContentResponse = serde_json::from_str(payload.trim())?;
    let text = chunk.text();
    Ok((!text.is_empty()).then_some(text))
}

fn generated_text(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static {
    async_stream::try_stream! {
        let mut lines = Box::pin(body_lines(response));
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| ProviderError::new(KIND, e))?;
            if let Some(text) = sse_text(&line).map_err(|e| ProviderError::new(KIND, e))? {
                yield text;
            }
        }
    }
}

#[async_trait]
impl VideoProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn analyze(&self, video_id: &str, prompt: &str) -> Result<String, ProviderError> {
        self.generate(video_id, prompt, false)
            .await
            .map_err(|e| ProviderError::new(KIND, e))
    }

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError> {
        debug!(video_id, model = %self.model, "Gemini streamGenerateContent");
        let body = self.request_body(video_id, prompt, false);
        let response = self
            .post("streamGenerateContent?alt=sse", &body)
            .await
            .map_err(|e| ProviderError::new(KIND, e))?;

        Ok(generated_text(response).boxed())
    }

    async fn gist(&self, video_id: &str) -> Result<Gist, ProviderError> {
        let text = self
            .generate(video_id, GIST_PROMPT, true)
            .await
            .map_err(|e| ProviderError::new(KIND, e))?;

        parse_gist(&text).map_err(|e| ProviderError::new(KIND, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(Client::new(), "key".into())
    }

    #[test]
    fn file_ids_resolve_to_uris() {
        let p = provider();
        assert_eq!(
            p.file_uri("files/abc123"),
            "https://generativelanguage.googleapis.com/v1beta/files/abc123"
        );
        assert_eq!(
            p.file_uri("abc123"),
            "https://generativelanguage.googleapis.com/v1beta/files/abc123"
        );
        assert_eq!(p.file_uri("https://example.com/v.mp4"), "https://example.com/v.mp4");
    }

    #[test]
    fn candidates_text_is_concatenated() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "students"}]}}]
        }))
        .unwrap();
        assert_eq!(response.text(), "Hello, students");
    }

    #[test]
    fn sse_lines_carry_chunks() {
        let line = r#"data: {"candidates": [{"content": {"parts": [{"text": "chunk"}]}}]}"#;
        assert_eq!(sse_text(line).unwrap(), Some("chunk".to_string()));
        assert_eq!(sse_text(": keep-alive").unwrap(), None);
        assert!(sse_text("data: {oops").is_err());
    }

    #[test]
    fn json_mode_sets_response_mime_type() {
        let body = provider().request_body("files/x", "prompt", true);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["contents"][0]["parts"][1]["text"], "prompt");
    }
}
