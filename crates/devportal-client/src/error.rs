//! Error types for `devportal-client`.

use std::sync::Arc;

use devportal_core::error::{ArchiveError, CryptoError, ValidationError};
use serde::Deserialize;

/// All errors surfaced by the portal client.
///
/// Cloneable so that one failed cached read can be handed to every caller
/// that was waiting on it; foreign error sources are held behind `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortalError {
    /// The backend answered with a non-success status.
    #[error("backend error {status}: {message}")]
    Api { status: u16, message: String },

    /// The backend rejected the session. Sign-out has already been started.
    #[error("session expired or unauthorized: {message}")]
    Unauthorized { message: String },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    /// A response body did not have the expected shape.
    #[error("invalid response body: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// The identity provider could not supply a token or user.
    #[error("identity provider error: {reason}")]
    Identity { reason: String },

    /// No signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// The developer record carries no email to put in the manifest.
    #[error("developer email is not available")]
    MissingDeveloperEmail,

    /// A signing request succeeded but the response carried no certificate.
    #[error("the backend returned no signed certificate")]
    MissingCertificate,

    /// A certificate issuance is already running.
    #[error("a certificate issuance is already in progress")]
    IssuanceInProgress,

    /// Missing or malformed configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A saved cookie store could not be read or written.
    #[error("cookie store error: {0}")]
    Cookies(String),

    /// Local file I/O, e.g. writing the credential archive.
    #[error("i/o error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl PortalError {
    /// HTTP status if this error came from a backend response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Message suitable for a status line: the backend's own message for
    /// API errors, the display text otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Unauthorized { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Build the error for a failed response from its status and raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = backend_message(body).unwrap_or_else(|| format!("HTTP {status}"));
        if status == 401 {
            Self::Unauthorized { message }
        } else {
            Self::Api { status, message }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Text(String),
    Object {
        #[serde(default)]
        error: Option<ErrorField>,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Object {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Pull a human-readable message out of the backend's error payload, which
/// comes in several shapes depending on which layer produced it.
fn backend_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let message = match parsed {
        ErrorBody::Text(text) => Some(text),
        ErrorBody::Object { error, message } => match error {
            Some(ErrorField::Text(text)) => Some(text),
            Some(ErrorField::Object { message: Some(m) }) => Some(m),
            _ => message,
        },
    };
    message.filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> String {
        PortalError::from_response(500, body).user_message()
    }

    #[test]
    fn parses_every_error_shape() {
        assert_eq!(message(r#"{"error": "quota exceeded"}"#), "quota exceeded");
        assert_eq!(message(r#"{"error": {"message": "bad key"}}"#), "bad key");
        assert_eq!(message(r#"{"message": "not allowed"}"#), "not allowed");
        assert_eq!(message(r#""plain text""#), "plain text");
    }

    #[test]
    fn falls_back_to_status() {
        assert_eq!(message("<html>oops</html>"), "HTTP 500");
        assert_eq!(message(""), "HTTP 500");
        assert_eq!(message(r#"{"error": {"code": 3}}"#), "HTTP 500");
    }

    #[test]
    fn unauthorized_is_tagged() {
        let err = PortalError::from_response(401, r#"{"error": "Unauthorized"}"#);
        assert!(matches!(err, PortalError::Unauthorized { .. }));
        assert_eq!(err.status(), Some(401));

        let err = PortalError::from_response(404, "{}");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "backend error 404: HTTP 404");
    }
}
