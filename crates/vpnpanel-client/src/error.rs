//! Error taxonomy for the portal client.

use reqwest::StatusCode;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Request never got a response (offline, DNS, TLS, reset).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-2xx status.
    #[error("Server rejected request ({status}): {message}")]
    Server { status: StatusCode, message: String },

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Cancelled")]
    Cancelled,

    /// Client-side precondition failed before any request was sent.
    #[error("{0}")]
    Rejected(String),
}

impl ClientError {
    /// Message suitable for showing on a screen.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error, please try again".to_string(),
            Self::Server { message, .. } => message.clone(),
            Self::NotAuthenticated => "Please sign in again".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Server { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}

impl From<rusqlite::Error> for ClientError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
