use thiserror::Error;

/// Error types produced by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response body from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Create a new InvalidCredentials error
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    /// Create a new Network error
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create a new Status error
    pub fn status(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a new Decode error
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Errors a data consumer reports while keeping its last good result.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::Status { .. } | Self::Decode { .. }
        )
    }

    /// Errors that mean the user has to (re)authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. } | Self::Unauthenticated)
    }

    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthenticated => Some(401),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(url)
        } else if err.is_decode() {
            Self::decode(url, err.to_string())
        } else {
            Self::network(url, err.to_string())
        }
    }
}

/// Errors raised by credential stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt credential file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SessionError::network("/clubs", "connection refused").is_transient());
        assert!(SessionError::timeout("/clubs").is_transient());
        assert!(SessionError::status("/clubs", 500, "boom").is_transient());
        assert!(!SessionError::Unauthenticated.is_transient());
        assert!(!SessionError::invalid_credentials("nope").is_transient());
    }

    #[test]
    fn test_auth_classification() {
        assert!(SessionError::Unauthenticated.is_auth());
        assert!(SessionError::invalid_credentials("bad password").is_auth());
        assert!(!SessionError::config("x").is_auth());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(SessionError::status("/x", 404, "").http_status(), Some(404));
        assert_eq!(SessionError::Unauthenticated.http_status(), Some(401));
        assert_eq!(SessionError::timeout("/x").http_status(), None);
    }
}
