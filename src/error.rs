//! Error types for the shell-cache library.

use thiserror::Error;

/// Errors that can occur while staging, reconciling or serving cached assets.
#[derive(Error, Debug)]
pub enum Error {
    /// A named cache store could not be opened, read or written.
    #[error("cache store '{store}' unavailable: {message}")]
    Store {
        /// Logical name of the store.
        store: String,
        /// Description of the failure.
        message: String,
    },

    /// I/O error from an on-disk store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level fetch failure (offline, DNS, connection reset).
    #[error("network error fetching {url}: {message}")]
    Network {
        /// URL that was being fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// Transport-level failure reported by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response resolved, but with a status that cannot be cached.
    #[error("unexpected status {status} for {url}")]
    BadStatus {
        /// URL that was fetched.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The persisted manifest record could not be deserialized.
    #[error("malformed manifest record: {0}")]
    ManifestRecord(#[source] serde_json::Error),

    /// The manifest itself is inconsistent.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A URL could not be parsed or joined.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// An inbound message did not name a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A lifecycle operation was attempted in the wrong state.
    #[error("invalid state: {0}")]
    State(String),
}

impl Error {
    /// Creates a store error for the named store.
    pub fn store(store: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Store {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Creates a transport error for the given URL.
    pub fn network(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this error is a transport-level fetch failure.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Http(_))
    }
}

/// A specialized `Result` type for shell-cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_classification() {
        assert!(Error::network("https://app.test/", "offline").is_network());
        assert!(!Error::store("app-cache", "quota").is_network());
        assert!(
            !Error::BadStatus {
                url: "https://app.test/a.js".into(),
                status: 500
            }
            .is_network()
        );
    }

    #[test]
    fn store_error_names_the_store() {
        let err = Error::store("app-temp-cache", "gone");
        assert_eq!(err.to_string(), "cache store 'app-temp-cache' unavailable: gone");
    }
}
