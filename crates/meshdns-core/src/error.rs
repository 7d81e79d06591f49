//! Error types for the meshdns system
//!
//! Errors fall in two groups. Run-fatal errors (source, zone query,
//! validation) abort a reconciliation run before anything is applied.
//! Mutation errors are recorded per operation in the run summary and never
//! stop the remaining operations.

use thiserror::Error;

/// Result type alias for meshdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the meshdns system
#[derive(Error, Debug)]
pub enum Error {
    /// The mesh inventory could not be retrieved
    #[error("Inventory source unavailable: {0}")]
    SourceUnavailable(String),

    /// Zone scan failed or was incomplete
    #[error("Provider query failed ({provider}): {message}")]
    ProviderQuery {
        /// Provider name
        provider: String,
        /// Error message, including provider-side codes
        message: String,
    },

    /// A single create/update/delete call failed
    #[error("Provider mutation failed ({provider}): {message}")]
    ProviderMutation {
        /// Provider name
        provider: String,
        /// Error message, including provider-side codes
        message: String,
    },

    /// Malformed configuration, detected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another run currently holds the run guard
    #[error("A reconciliation run is already in progress")]
    RunInProgress,

    /// I/O errors (child processes, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an inventory source error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a zone query error
    pub fn provider_query(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderQuery {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a record mutation error
    pub fn provider_mutation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderMutation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error aborts a whole run (as opposed to one operation)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ProviderMutation { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_errors_are_not_fatal() {
        assert!(!Error::provider_mutation("cloudflare", "boom").is_fatal());
        assert!(Error::provider_query("cloudflare", "boom").is_fatal());
        assert!(Error::source_unavailable("down").is_fatal());
        assert!(Error::validation("no domain").is_fatal());
    }

    #[test]
    fn display_carries_provider_context() {
        let err = Error::provider_query("cloudflare", "HTTP 403: code 10000 Authentication error");
        let text = err.to_string();
        assert!(text.contains("cloudflare"));
        assert!(text.contains("10000"));
    }
}
