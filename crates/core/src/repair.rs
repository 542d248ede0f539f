use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{LecternError, RepairFailure},
    provider::ProviderConfig,
    schema::{SchemaDescriptor, extract_json},
};

/// Single-shot text to structured-data rewrite, used only after validation fails.
#[async_trait]
pub trait Reformatter: Send + Sync {
    async fn reformat(
        &self,
        raw: &str,
        descriptor: &SchemaDescriptor,
    ) -> Result<Value, RepairFailure>;
}

/// OpenAI-compatible chat-completions backends the reformatter can use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReformatBackend {
    #[default]
    Grok,
    Openai,
    Gemini,
}

impl ReformatBackend {
    pub fn config(&self) -> ProviderConfig {
        match self {
            ReformatBackend::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            ReformatBackend::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
            },
            ReformatBackend::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReformatBackend::Grok => "Grok",
            ReformatBackend::Openai => "OpenAI",
            ReformatBackend::Gemini => "Gemini",
        }
    }
}

impl fmt::Display for ReformatBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReformatBackend {
    type Err = LecternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grok" | "xai" => Ok(ReformatBackend::Grok),
            "openai" => Ok(ReformatBackend::Openai),
            "gemini" => Ok(ReformatBackend::Gemini),
            other => Err(LecternError::Config(format!(
                "unknown reformat backend {other:?} (expected grok, openai or gemini)"
            ))),
        }
    }
}

pub fn reformat_prompt(raw: &str, descriptor: &SchemaDescriptor) -> String {
    format!(
        "Reformat the following text to match this JSON schema ({name}): {shape}\n\
         Change the tone to be instructional towards a student trying to learn.\n\
         Respond with a single JSON object only.\n\n\
         The text is:\n{raw}",
        name = descriptor.name,
        shape = descriptor.shape,
    )
}

pub struct ChatReformatter {
    client: Client,
    backend: ReformatBackend,
    api_key: Option<String>,
    calls: AtomicUsize,
}

impl ChatReformatter {
    pub fn new(client: Client, backend: ReformatBackend, api_key: Option<String>) -> Self {
        Self {
            client,
            backend,
            api_key,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.reformat_api_key.is_none() {
            warn!(
                "Reformatting disabled: {} is not set; malformed output will fail",
                config.reformat_backend.config().env_var
            );
        }
        Self::new(Client::new(), config.reformat_backend, config.reformat_api_key.clone())
    }

    /// How many repairs have been attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Reformatter for ChatReformatter {
    async fn reformat(
        &self,
        raw: &str,
        descriptor: &SchemaDescriptor,
    ) -> Result<Value, RepairFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let fail = |reason: String| RepairFailure::new(descriptor.kind, reason);

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| fail(format!("{} is not set", self.backend.config().env_var)))?;

        let config = self.backend.config();
        debug!(
            backend = self.backend.name(),
            schema = descriptor.name,
            "Reformatting model output"
        );

        let response = self
            .client
            .post(config.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&serde_json::json!({
                "model": config.model,
                "messages": [
                    {
                        "role": "user",
                        "content": reformat_prompt(raw, descriptor),
                    },
                ],
                "response_format": { "type": "json_object" },
                "temperature": 0.3,
            }))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("{} returned {}: {}", self.backend.name(), status, body)));
        }

        let response = response
            .json::<Value>()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| fail(format!("Invalid API response: {:?}", response)))?;

        serde_json::from_str(extract_json(content))
            .map_err(|e| fail(format!("reformatter returned invalid JSON: {e}")))
    }
}
