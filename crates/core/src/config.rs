use std::{path::PathBuf, str::FromStr};

use tracing::debug;

use crate::{
    error::{LecternError, Result},
    provider::ProviderKind,
    repair::ReformatBackend,
};

pub const DEFAULT_AWS_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub twelve_labs_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub aws_bearer_token: Option<String>,
    pub aws_region: String,
    pub aws_video_bucket: Option<String>,
    pub reformat_backend: ReformatBackend,
    /// Falls back to the backend's own env var when unset.
    pub reformat_api_key: Option<String>,
    pub store_dir: PathBuf,
    pub max_concurrent_requests: usize,
    pub stream_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            twelve_labs_api_key: None,
            gemini_api_key: None,
            aws_bearer_token: None,
            aws_region: DEFAULT_AWS_REGION.to_string(),
            aws_video_bucket: None,
            reformat_backend: ReformatBackend::default(),
            reformat_api_key: None,
            store_dir: default_store_dir(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("lectern")
}

impl Config {
    /// Build from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let key = |kind: ProviderKind| var(kind.config().env_var);

        let reformat_backend = match var("LECTERN_REFORMAT_BACKEND") {
            Some(tag) => tag.parse()?,
            None => ReformatBackend::default(),
        };

        let config = Self {
            twelve_labs_api_key: key(ProviderKind::TwelveLabs),
            gemini_api_key: key(ProviderKind::Google),
            aws_bearer_token: key(ProviderKind::Aws),
            aws_region: var("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            aws_video_bucket: var("LECTERN_VIDEO_BUCKET"),
            reformat_api_key: var(reformat_backend.config().env_var),
            reformat_backend,
            store_dir: var("LECTERN_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_dir),
            max_concurrent_requests: parse_positive(
                "LECTERN_MAX_CONCURRENT_REQUESTS",
                var("LECTERN_MAX_CONCURRENT_REQUESTS"),
                DEFAULT_MAX_CONCURRENT_REQUESTS,
            )?,
            stream_buffer: parse_positive(
                "LECTERN_STREAM_BUFFER",
                var("LECTERN_STREAM_BUFFER"),
                DEFAULT_STREAM_BUFFER,
            )?,
        };

        debug!(
            store_dir = %config.store_dir.display(),
            reformat_backend = config.reformat_backend.name(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn parse_positive(name: &str, value: Option<String>, default: usize) -> Result<usize> {
    let Some(value) = value else {
        return Ok(default);
    };

    match usize::from_str(&value) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LecternError::Config(format!(
            "{name} must be a positive integer, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.aws_region, "us-east-1");
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.stream_buffer, 64);
        assert_eq!(config.reformat_backend, ReformatBackend::Grok);
        assert!(config.twelve_labs_api_key.is_none());
        assert!(config.store_dir.ends_with("lectern"));
    }

    #[test]
    fn provider_keys_come_from_their_env_vars() {
        let config = Config::from_lookup(lookup(&[
            ("TWELVE_LABS_API_KEY", "tl"),
            ("GEMINI_API_KEY", "  "),
            ("AWS_BEARER_TOKEN_BEDROCK", "aws"),
            ("AWS_REGION", "eu-central-1"),
            ("LECTERN_REFORMAT_BACKEND", "openai"),
            ("OPENAI_API_KEY", "sk"),
        ]))
        .unwrap();

        assert_eq!(config.twelve_labs_api_key.as_deref(), Some("tl"));
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.aws_bearer_token.as_deref(), Some("aws"));
        assert_eq!(config.aws_region, "eu-central-1");
        assert_eq!(config.reformat_backend, ReformatBackend::Openai);
        assert_eq!(config.reformat_api_key.as_deref(), Some("sk"));
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        assert_matches!(
            Config::from_lookup(lookup(&[("LECTERN_MAX_CONCURRENT_REQUESTS", "0")])),
            Err(LecternError::Config(_))
        );
        assert_matches!(
            Config::from_lookup(lookup(&[("LECTERN_STREAM_BUFFER", "lots")])),
            Err(LecternError::Config(_))
        );
        assert_matches!(
            Config::from_lookup(lookup(&[("LECTERN_REFORMAT_BACKEND", "claude")])),
            Err(LecternError::Config(_))
        );
    }
}
