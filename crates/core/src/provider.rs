use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{LecternError, ProviderCause, ProviderError},
    providers::{GeminiProvider, NovaProvider, TwelveLabsProvider},
    types::Gist,
};

/// Incremental text produced by a provider. Lazy, finite and not restartable.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    TwelveLabs,
    Google,
    Aws,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::TwelveLabs,
        ProviderKind::Google,
        ProviderKind::Aws,
    ];

    pub fn config(&self) -> ProviderConfig {
        match self {
            ProviderKind::TwelveLabs => ProviderConfig {
                api_url: "https://api.twelvelabs.io/v1.3",
                model: "pegasus1.2",
                env_var: "TWELVE_LABS_API_KEY",
            },
            ProviderKind::Google => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
            ProviderKind::Aws => ProviderConfig {
                api_url: "https://bedrock-runtime.{region}.amazonaws.com",
                model: "us.amazon.nova-pro-v1:0",
                env_var: "AWS_BEARER_TOKEN_BEDROCK",
            },
        }
    }

    /// Tag used on the wire and in stored documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::TwelveLabs => "twelvelabs",
            ProviderKind::Google => "google",
            ProviderKind::Aws => "aws",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::TwelveLabs => "TwelveLabs",
            ProviderKind::Google => "Google Gemini",
            ProviderKind::Aws => "AWS Nova",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LecternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twelvelabs" | "twelve_labs" | "twelve-labs" => Ok(ProviderKind::TwelveLabs),
            "google" | "gemini" => Ok(ProviderKind::Google),
            "aws" | "nova" => Ok(ProviderKind::Aws),
            _ => Err(LecternError::InvalidProvider { tag: s.to_string() }),
        }
    }
}

/// Capability shared by every video-understanding backend.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn analyze(&self, video_id: &str, prompt: &str) -> Result<String, ProviderError>;

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError>;

    async fn gist(&self, video_id: &str) -> Result<Gist, ProviderError>;
}

/// Caps how many provider calls are in flight at once across the process.
struct Bounded {
    inner: Arc<dyn VideoProvider>,
    permits: Arc<Semaphore>,
}

impl Bounded {
    async fn permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, ProviderError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| {
                let cause = ProviderCause::Other("request pool closed".into());
                ProviderError::new(self.inner.kind(), cause)
            })
    }
}

#[async_trait]
impl VideoProvider for Bounded {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    async fn analyze(&self, video_id: &str, prompt: &str) -> Result<String, ProviderError> {
        let _permit = self.permit().await?;
        self.inner.analyze(video_id, prompt).await
    }

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<TextStream, ProviderError> {
        let permit = self.permit().await?;
        let stream = self.inner.analyze_stream(video_id, prompt).await?;

        // the permit lives as long as the stream
        Ok(stream
            .map(move |chunk| {
                let _held = &permit;
                chunk
            })
            .boxed())
    }

    async fn gist(&self, video_id: &str) -> Result<Gist, ProviderError> {
        let _permit = self.permit().await?;
        self.inner.gist(video_id).await
    }
}

/// Provider clients, built once per process and shared by every component.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn VideoProvider>>,
    permits: Arc<Semaphore>,
}

impl ProviderRegistry {
    pub fn new(max_concurrent_requests: usize) -> Self {
        Self {
            providers: BTreeMap::new(),
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn VideoProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        let kind = provider.kind();
        debug!(provider = %kind, "Registering video provider");
        self.providers.insert(
            kind,
            Arc::new(Bounded {
                inner: provider,
                permits: Arc::clone(&self.permits),
            }),
        );
    }

    /// Build an adapter for every provider whose credentials are configured.
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new(config.max_concurrent_requests);

        for kind in ProviderKind::ALL {
            let adapter: Option<Arc<dyn VideoProvider>> = match kind {
                ProviderKind::TwelveLabs => config.twelve_labs_api_key.as_ref().map(|key| {
                    Arc::new(TwelveLabsProvider::new(client.clone(), key.clone()))
                        as Arc<dyn VideoProvider>
                }),
                ProviderKind::Google => config.gemini_api_key.as_ref().map(|key| {
                    Arc::new(GeminiProvider::new(client.clone(), key.clone()))
                        as Arc<dyn VideoProvider>
                }),
                ProviderKind::Aws => config.aws_bearer_token.as_ref().map(|token| {
                    Arc::new(NovaProvider::new(
                        client.clone(),
                        token.clone(),
                        &config.aws_region,
                        config.aws_video_bucket.clone(),
                    )) as Arc<dyn VideoProvider>
                }),
            };

            match adapter {
                Some(adapter) => registry.register(adapter),
                None => warn!("{} disabled: {} is not set", kind.name(), kind.config().env_var),
            }
        }

        info!(
            providers = ?registry.available(),
            max_concurrent_requests = config.max_concurrent_requests,
            "Provider registry ready"
        );
        registry
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn VideoProvider>, LecternError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(LecternError::ProviderNotConfigured { provider: kind })
    }

    /// Resolve a caller-supplied provider tag.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn VideoProvider>, LecternError> {
        self.get(tag.parse()?)
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use futures::stream;

    use super::*;

    #[test]
    fn provider_tags_parse() {
        assert_eq!("twelvelabs".parse::<ProviderKind>().unwrap(), ProviderKind::TwelveLabs);
        assert_eq!("Google".parse::<ProviderKind>().unwrap(), ProviderKind::Google);
        assert_eq!("aws".parse::<ProviderKind>().unwrap(), ProviderKind::Aws);
        assert_matches!(
            "openai".parse::<ProviderKind>(),
            Err(LecternError::InvalidProvider { tag }) if tag == "openai"
        );
    }

    #[test]
    fn provider_tags_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::TwelveLabs).unwrap(), "\"twelvelabs\"");
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    struct Counting {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl VideoProvider for Counting {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Google
        }

        async fn analyze(&self, _video_id: &str, _prompt: &str) -> Result<String, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".into())
        }

        async fn analyze_stream(
            &self,
            _video_id: &str,
            _prompt: &str,
        ) -> Result<TextStream, ProviderError> {
            Ok(stream::iter(vec![Ok("a".to_string())]).boxed())
        }

        async fn gist(&self, _video_id: &str) -> Result<Gist, ProviderError> {
            Ok(Gist::default())
        }
    }

    #[tokio::test]
    async fn registry_bounds_concurrent_calls() {
        let counting = Arc::new(Counting {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let registry = ProviderRegistry::new(2).with_provider(counting.clone());
        let provider = registry.get(ProviderKind::Google).unwrap();

        let calls = (0..6).map(|_| provider.analyze("v", "p"));
        futures::future::join_all(calls).await;

        assert_eq!(counting.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unconfigured_provider_is_reported() {
        let registry = ProviderRegistry::new(1);
        assert_matches!(
            registry.resolve("aws").err(),
            Some(LecternError::ProviderNotConfigured { provider: ProviderKind::Aws })
        );
        assert_matches!(
            registry.resolve("vimeo").err(),
            Some(LecternError::InvalidProvider { .. })
        );
    }
}
