use thiserror::Error;

/// Prefix shared by every error reply the gateway hands back in place of model text.
pub const ERROR_PREFIX: &str = "Error: ";

/// Failures an AI provider call can end in.
///
/// Callers never see these as values: the gateway renders them through `Display`
/// into a reply string starting with [`ERROR_PREFIX`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Error: no API keys for {provider}")]
    NoCredential { provider: String },

    #[error("Error: {provider} rate limit exceeded, try again later")]
    RateLimitExhausted { provider: String },

    #[error("Error: unsupported provider {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Error: {provider} request timed out")]
    Timeout { provider: String },

    #[error("Error: {provider} API returned {status}")]
    Http { provider: String, status: u16 },

    #[error("Error: {provider} transport failure: {message}")]
    Transport { provider: String, message: String },

    #[error("Error: {provider} returned an unreadable response")]
    MalformedResponse { provider: String },
}

impl GatewayError {
    pub fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        GatewayError::Transport {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    /// Maps a reqwest failure onto the timeout/transport split.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            GatewayError::transport(provider, err)
        }
    }
}
