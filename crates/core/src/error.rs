use thiserror::Error;

use crate::{provider::ProviderKind, schema::ArtifactKind};

/// What went wrong inside a provider backend, before it is tagged with the provider.
#[derive(Error, Debug)]
pub enum ProviderCause {
    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: &'static str },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// A backend call failed (network, auth, quota, unexpected payload).
#[derive(Error, Debug)]
#[error("{provider} request failed: {cause}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    #[source]
    pub cause: ProviderCause,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, cause: impl Into<ProviderCause>) -> Self {
        Self {
            provider,
            cause: cause.into(),
        }
    }
}

/// Raw model output did not match the target schema. Recoverable through repair.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{artifact} failed validation: {detail}")]
pub struct ValidationError {
    pub artifact: ArtifactKind,
    pub detail: String,
}

impl ValidationError {
    pub fn new(artifact: ArtifactKind, detail: impl Into<String>) -> Self {
        Self {
            artifact,
            detail: detail.into(),
        }
    }
}

/// The reformatting collaborator failed or returned something unusable.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Repair of {artifact} failed: {reason}")]
pub struct RepairFailure {
    pub artifact: ArtifactKind,
    pub reason: String,
}

impl RepairFailure {
    pub fn new(artifact: ArtifactKind, reason: impl Into<String>) -> Self {
        Self {
            artifact,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item {key} is not a JSON object")]
    NotAnObject { key: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

#[derive(Error, Debug)]
pub enum LecternError {
    #[error("Unknown provider: {tag}")]
    InvalidProvider { tag: String },

    #[error("Provider {provider} is not configured")]
    ProviderNotConfigured { provider: ProviderKind },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Generation of {artifact} failed: {source}")]
    Generation {
        artifact: ArtifactKind,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repair(#[from] RepairFailure),

    #[error("Cannot generate {artifact}: {dependency} is required")]
    MissingDependency {
        artifact: ArtifactKind,
        dependency: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LecternError {
    /// Stable machine-readable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            LecternError::InvalidProvider { .. } => "invalid_provider",
            LecternError::ProviderNotConfigured { .. } => "provider_not_configured",
            LecternError::Provider(_) => "provider_error",
            LecternError::Generation { .. } => "generation_error",
            LecternError::Validation(_) => "validation_error",
            LecternError::Repair(_) => "repair_failure",
            LecternError::MissingDependency { .. } => "missing_dependency",
            LecternError::InvalidRequest(_) => "invalid_request",
            LecternError::NotFound(_) => "not_found",
            LecternError::Store(_) => "store_error",
            LecternError::Json(_) => "json_error",
            LecternError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, LecternError>;
