//! Error types for source scraping and remote calendar operations.
//!
//! A single [`ProviderError`] carries a [`ProviderErrorCode`] that callers
//! match on to decide whether to retry, skip one event, or abort the run.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Missing or invalid configuration.
    Configuration,
    /// Login failed, session cookie missing, or OAuth token unusable.
    Authentication,
    /// Authenticated but not allowed (remote 403 that is not a rate limit).
    Authorization,
    /// A source page could not be retrieved.
    Fetch,
    /// A source page could not be decoded to text.
    Decode,
    /// Markup for one event did not have the expected shape.
    Extraction,
    /// The remote API asked us to slow down.
    RateLimited,
    /// The remote record does not exist.
    NotFound,
    /// The remote record already exists.
    Conflict,
    /// The remote API failed with a 5xx status.
    Server,
    /// The remote API answered with something we could not parse.
    InvalidResponse,
    /// Any other remote API failure.
    Remote,
    /// Unexpected internal state.
    Internal,
}

impl ProviderErrorCode {
    /// Returns true if the operation should be retried after a cooldown.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Returns a human-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Authentication => "authentication_failed",
            Self::Authorization => "authorization_failed",
            Self::Fetch => "fetch_error",
            Self::Decode => "decode_error",
            Self::Extraction => "extraction_error",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Server => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::Remote => "remote_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from the source system or the remote calendar.
#[derive(Debug, Error)]
pub struct ProviderError {
    /// The error code categorizing this error.
    code: ProviderErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// Which side produced the error (e.g. "cybozu", "google").
    provider: Option<String>,
    /// The underlying cause of this error, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Authentication, message)
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Authorization, message)
    }

    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Fetch, message)
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Decode, message)
    }

    /// Creates an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Extraction, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Conflict, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Server, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a generic remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Remote, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Internal, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if the operation should be retried after a cooldown.
    pub fn is_rate_limited(&self) -> bool {
        self.code.is_rate_limited()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<cybozu2gcal_core::ConfigError> for ProviderError {
    fn from(err: cybozu2gcal_core::ConfigError) -> Self {
        Self::configuration(err.to_string()).with_source(err)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
