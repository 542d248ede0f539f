//! Concrete video-understanding backends.

pub mod gemini;
pub mod nova;
pub mod twelve_labs;

pub use gemini::GeminiProvider;
pub use nova::NovaProvider;
pub use twelve_labs::TwelveLabsProvider;

use futures::{Stream, StreamExt};

use crate::{error::ProviderCause, schema::extract_json, types::Gist};

/// Used by backends without a native gist endpoint.
pub(crate) const GIST_PROMPT: &str = r#"Watch the video and describe it for a course catalogue.
Respond with JSON only, no preamble:
{"title": string, "hashtags": [string], "topics": [string]}"#;

pub(crate) fn parse_gist(text: &str) -> Result<Gist, ProviderCause> {
    serde_json::from_str(extract_json(text)).map_err(ProviderCause::from)
}

pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderCause> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderCause::Status {
        status: status.as_u16(),
        body,
    })
}

/// Split a streamed response body into non-empty, trimmed lines.
pub(crate) fn body_lines(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, ProviderCause>> + Send + 'static {
    async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if !line.is_empty() {
                    yield line;
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        if !rest.is_empty() {
            yield rest;
        }
    }
}
