//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by the chat client.
///
/// Each variant carries enough context to print a useful one-line message;
/// the CLI shows `to_string()` directly to the user.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A caller passed a value the operation cannot work with
    /// (zero typing speed, blank username, empty message).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An authenticated call was attempted without a stored token.
    #[error("You must be logged in")]
    NotLoggedIn,

    /// The backend rejected the bearer token. The session has been cleared.
    #[error("Session expired. Please log in again.")]
    Unauthorized,

    /// The backend replied with a non-2xx status.
    #[error("{msg} (HTTP {status})")]
    Api { status: u16, msg: String },

    /// A TCP-level connection could not be established or was dropped.
    #[error("Network error: could not reach {url}: {detail}")]
    Connect { url: String, detail: String },

    /// A response or session file did not have the expected JSON shape.
    #[error("malformed JSON: {detail}")]
    Json { detail: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Json {
            detail: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(e: toml::de::Error) -> Self {
        ChatError::Config(e.to_string())
    }
}

impl ChatError {
    /// True when the error means the user has to log in (again).
    pub fn needs_login(&self) -> bool {
        matches!(self, ChatError::NotLoggedIn | ChatError::Unauthorized)
    }
}
