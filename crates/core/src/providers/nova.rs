use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    error::{ProviderCause, ProviderError},
    provider::{ProviderKind, TextStream, VideoProvider},
    providers::{GIST_PROMPT, check_status, parse_gist},
    types::Gist,
};

const KIND: ProviderKind = ProviderKind::Aws;
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Amazon Nova through the Bedrock Runtime Converse API, authenticated with a
/// Bedrock API key. Videos live in S3.
pub struct NovaProvider {
    client: Client,
    token: String,
    endpoint: String,
    model: String,
    video_bucket: Option<String>,
}

impl NovaProvider {
    pub fn new(client: Client, token: String, region: &str, video_bucket: Option<String>) -> Self {
        let config = KIND.config();
        Self {
            client,
            token,
            endpoint: config.api_url.replace("{region}", region),
            model: config.model.to_string(),
            video_bucket,
        }
    }

    fn video_uri(&self, video_id: &str) -> String {
        if video_id.starts_with("s3://") {
            return video_id.to_string();
        }
        match &self.video_bucket {
            Some(bucket) => format!("s3://{}/{}", bucket, video_id.trim_start_matches('/')),
            None => format!("s3://{video_id}"),
        }
    }

    fn request_body(&self, video_id: &str, prompt: &str) -> Value {
        let source = json!({ "s3Location": { "uri": self.video_uri(video_id) } });
        json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "video": { "format": "mp4", "source": source } },
                    { "text": prompt },
                ],
            }],
            "inferenceConfig": { "temperature": 0.2, "maxTokens": MAX_TOKENS },
        })
    }

    async fn converse(&self, video_id: &str, prompt: &str) -> Result<String, ProviderCause> {
        debug!(video_id, model = %self.model, "Bedrock converse");
        let response = self
            .client
            .post(format!("{}/model/{}/converse", self.endpoint, self.model))
            .bearer_auth(&self.token)
            .json(&self.request_body(video_id, prompt))
            .send()
            .await?;

        let body = check_status(response).await?.json::<ConverseResponse>().await?;
        let text: String = body
            .output
            .message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(ProviderCause::InvalidResponse("converse output has no text".into()));
        }
        Ok(text)
    }
}

#[async_trait]
impl VideoProvider for NovaProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn analyze(&self, video_id: &str, prompt: &str) -> Result<String, ProviderError> {
        self.converse(video_id, prompt)
            .await
            .map_err(|e| ProviderError::new(KIND, e))
    }

    /// ConverseStream uses AWS event-stream framing; the whole answer is
    /// delivered as a single chunk instead.
    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError> {
        let text = self.analyze(video_id, prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    async fn gist(&self, video_id: &str) -> Result<Gist, ProviderError> {
        let text = self.analyze(video_id, GIST_PROMPT).await?;
        parse_gist(&text).map_err(|e| ProviderError::new(KIND, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uses_region() {
        let p = NovaProvider::new(Client::new(), "t".into(), "eu-west-1", None);
        assert_eq!(p.endpoint, "https://bedrock-runtime.eu-west-1.amazonaws.com");
    }

    #[test]
    fn video_ids_resolve_to_s3_uris() {
        let with_bucket =
            NovaProvider::new(Client::new(), "t".into(), "us-east-1", Some("lectures".into()));
        assert_eq!(with_bucket.video_uri("week1/intro.mp4"), "s3://lectures/week1/intro.mp4");
        assert_eq!(with_bucket.video_uri("s3://other/x.mp4"), "s3://other/x.mp4");

        let without = NovaProvider::new(Client::new(), "t".into(), "us-east-1", None);
        assert_eq!(without.video_uri("bucket/x.mp4"), "s3://bucket/x.mp4");
    }

    #[test]
    fn converse_response_text_is_extracted() {
        let body: ConverseResponse = serde_json::from_value(json!({
            "output": {"message": {
                "role": "assistant",
                "content": [{"text": "{\"summary\": \"s\"}"}]
            }},
            "stopReason": "end_turn"
        }))
        .unwrap();
        assert_eq!(body.output.message.content[0].text.as_deref(), Some("{\"summary\": \"s\"}"));
    }
}
