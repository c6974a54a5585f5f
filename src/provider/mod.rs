pub mod claude;
pub mod openai;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{error, info};

pub const DISPATCH_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Claude,
    OpenAi,
}

impl ProviderKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "claude" => Some(Self::Claude),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::OpenAi => "OpenAI",
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::Claude
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    MissingApiKey,
    Authentication(String),
    Network(String),
    InvalidResponse(String),
    EmptyResponse,
    Provider(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "Missing rephrasing provider API key"),
            Self::Authentication(message) => write!(f, "Authentication failed: {message}"),
            Self::Network(message) => write!(f, "Network error: {message}"),
            Self::InvalidResponse(message) => write!(f, "Invalid provider response: {message}"),
            Self::EmptyResponse => write!(f, "Provider returned no rephrased text"),
            Self::Provider(message) => write!(f, "Rephrasing provider error: {message}"),
        }
    }
}

impl std::error::Error for ProviderError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Timeout(Duration),
    Provider(ProviderError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(ceiling) => {
                write!(f, "Provider did not respond within {}s", ceiling.as_secs())
            }
            Self::Provider(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for DispatchError {}

#[async_trait]
pub trait RephraseProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider has the credentials it needs to serve a
    /// request. Checked before any clipboard borrow starts.
    fn is_configured(&self) -> bool {
        true
    }

    /// Sends `text` to the provider with the style's `prompt` and
    /// returns the rephrased text, trimmed.
    async fn rephrase(&self, text: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Races the active provider against a wall-clock ceiling. The ceiling
/// is independent of the HTTP client's own timeout so a stalled request
/// can never hold the pipeline past it; the losing future is dropped,
/// which aborts the in-flight request.
#[derive(Clone)]
pub struct ProviderDispatcher {
    active_provider: Arc<dyn RephraseProvider>,
    ceiling: Duration,
}

impl fmt::Debug for ProviderDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDispatcher")
            .field("active_provider", &self.active_provider.name())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

impl ProviderDispatcher {
    pub fn new(active_provider: Arc<dyn RephraseProvider>) -> Self {
        Self::with_ceiling(active_provider, Duration::from_secs(DISPATCH_TIMEOUT_SECS))
    }

    pub fn with_ceiling(active_provider: Arc<dyn RephraseProvider>, ceiling: Duration) -> Self {
        Self {
            active_provider,
            ceiling,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.active_provider.name()
    }

    pub fn is_configured(&self) -> bool {
        self.active_provider.is_configured()
    }

    pub async fn dispatch(&self, text: &str, prompt: &str) -> Result<String, DispatchError> {
        info!(
            provider = self.active_provider.name(),
            chars = text.chars().count(),
            "dispatching rephrase request"
        );

        tokio::select! {
            result = self.active_provider.rephrase(text, prompt) => {
                result.map_err(|provider_error| {
                    error!(
                        provider = self.active_provider.name(),
                        error = %provider_error,
                        "rephrase request failed"
                    );
                    DispatchError::Provider(provider_error)
                })
            }
            _ = tokio::time::sleep(self.ceiling) => {
                error!(
                    provider = self.active_provider.name(),
                    ceiling_secs = self.ceiling.as_secs(),
                    "rephrase request hit the dispatch ceiling"
                );
                Err(DispatchError::Timeout(self.ceiling))
            }
        }
    }
}

pub(crate) fn normalize_response_text(raw_text: &str) -> String {
    raw_text.trim().to_string()
}
