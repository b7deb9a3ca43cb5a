// src/error.rs
use serde::Deserialize;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    AuthExpired,
    NotAuthenticated,
    Forbidden(String),
    Validation(String),
    ConcurrentModification(String),
    Server { status: u16, message: String },
    Network(String),
    Timeout,
    Decode(String),
    Export(String),
    Io(std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Shape of the optional message body carried by non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
    message: Option<String>,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::AuthExpired => write!(f, "Session expired: please sign in again"),
            ClientError::NotAuthenticated => write!(f, "Not authenticated"),
            ClientError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ClientError::Validation(msg) => write!(f, "{}", msg),
            ClientError::ConcurrentModification(msg) => write!(f, "{}", msg),
            ClientError::Server { status, message } => write!(f, "Server error ({}): {}", status, message),
            ClientError::Network(msg) => write!(f, "Network failure: {}", msg),
            ClientError::Timeout => write!(f, "Network failure: request timed out"),
            ClientError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            ClientError::Export(msg) => write!(f, "Export failed: {}", msg),
            ClientError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::from_status(status.as_u16(), None)
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<image::ImageError> for ClientError {
    fn from(err: image::ImageError) -> Self {
        ClientError::Export(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<csv::Error> for ClientError {
    fn from(err: csv::Error) -> Self {
        ClientError::Export(err.to_string())
    }
}

impl ClientError {
    /// Maps a non-2xx status and its body to the client taxonomy.
    pub fn from_status(status: u16, body: Option<&[u8]>) -> Self {
        let message = body
            .and_then(extract_message)
            .unwrap_or_else(|| generic_message(status));

        match status {
            401 => ClientError::AuthExpired,
            403 => ClientError::Forbidden(message),
            404 | 409 | 410 => ClientError::ConcurrentModification(message),
            400..=499 => ClientError::Validation(message),
            _ => ClientError::Server { status, message },
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ClientError::AuthExpired)
    }

    /// Failures where no response was received at all.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout)
    }

    /// The acted-on entity no longer matches the server; the catalog must be reconciled.
    pub fn needs_catalog_refresh(&self) -> bool {
        matches!(self, ClientError::ConcurrentModification(_))
    }

    /// Text shown to the user. Server-provided messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg)
            | ClientError::ConcurrentModification(msg)
            | ClientError::Forbidden(msg) => msg.clone(),
            ClientError::Server { message, .. } => message.clone(),
            ClientError::Network(_) | ClientError::Timeout => {
                "Could not reach the server. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    pub fn dataset_not_loaded() -> Self {
        ClientError::Validation("Select a dataset first".to_string())
    }

    pub fn dataset_loading() -> Self {
        ClientError::Validation("Dataset is still loading".to_string())
    }

    pub fn admin_required() -> Self {
        ClientError::Forbidden("Administrator role required".to_string())
    }
}

fn extract_message(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    parsed
        .error
        .or(parsed.detail)
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty())
}

fn generic_message(status: u16) -> String {
    format!("Request failed (HTTP {})", status)
}
