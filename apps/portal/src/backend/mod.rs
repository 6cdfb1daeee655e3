//! Backend client, the single point of entry for the portal's REST backend.
//!
//! Every endpoint answers with a `{success, user | data | message | error}`
//! envelope; this module owns the decoding of that envelope so callers only
//! ever see typed payloads or a `BackendError`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{ProfileSyncError, UpdateError};

pub mod ats;
pub mod users;

pub use ats::{AtsError, AtsReport, AtsSubmission, ResumeFile, ScoreBand};
pub use users::ProfileStore;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Response carried no payload")]
    EmptyPayload,
}

impl BackendError {
    fn is_transport(&self) -> bool {
        match self {
            BackendError::Http(_) => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<BackendError> for ProfileSyncError {
    fn from(e: BackendError) -> Self {
        if e.is_transport() {
            return ProfileSyncError::Unreachable(e.to_string());
        }
        match e {
            BackendError::Api { message, .. } | BackendError::Rejected(message) => {
                ProfileSyncError::Rejected(message)
            }
            other => ProfileSyncError::Malformed(other.to_string()),
        }
    }
}

impl From<BackendError> for UpdateError {
    fn from(e: BackendError) -> Self {
        if e.is_transport() {
            return UpdateError::Network(e.to_string());
        }
        match e {
            BackendError::Api { message, .. } | BackendError::Rejected(message) => {
                UpdateError::Rejected(message)
            }
            other => UpdateError::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    user: Option<Value>,
    data: Option<Value>,
    message: Option<String>,
    error: Option<Value>,
}

impl Envelope {
    fn failure_message(&self) -> Option<String> {
        if let Some(message) = &self.message {
            return Some(message.clone());
        }
        match &self.error {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        }
    }
}

/// Which envelope field carries the payload.
#[derive(Debug, Clone, Copy)]
enum Payload {
    User,
    Data,
}

/// HTTP client for the portal REST backend. Cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and unwraps the envelope, returning the payload field.
    async fn call<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        payload: Payload,
    ) -> Result<T, BackendError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(BackendError::Parse(e)),
            Err(_) => {
                warn!("Backend returned {} with a non-JSON body", status);
                return Err(BackendError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }
        };

        if !envelope.success {
            let message = envelope
                .failure_message()
                .unwrap_or_else(|| format!("request failed with status {status}"));
            if status.is_server_error() {
                return Err(BackendError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            return Err(BackendError::Rejected(message));
        }

        let value = match payload {
            Payload::User => envelope.user,
            Payload::Data => envelope.data,
        }
        .filter(|v| !v.is_null())
        .ok_or(BackendError::EmptyPayload)?;

        debug!("Backend call succeeded with status {}", status);
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_failure_message_prefers_message() {
        let env = envelope(json!({ "success": false, "message": "User not found", "error": "x" }));
        assert_eq!(env.failure_message().as_deref(), Some("User not found"));
    }

    #[test]
    fn test_failure_message_reads_error_string_and_object() {
        let env = envelope(json!({ "success": false, "error": "Analysis failed" }));
        assert_eq!(env.failure_message().as_deref(), Some("Analysis failed"));

        let env = envelope(json!({ "success": false, "error": { "message": "bad pdf" } }));
        assert_eq!(env.failure_message().as_deref(), Some("bad pdf"));

        let env = envelope(json!({ "success": false }));
        assert_eq!(env.failure_message(), None);
    }

    #[test]
    fn test_missing_success_flag_counts_as_failure() {
        let env = envelope(json!({ "user": { "uid": "u-1" } }));
        assert!(!env.success);
    }

    #[test]
    fn test_server_errors_map_to_unreachable() {
        let err = BackendError::Api {
            status: 503,
            message: "down".to_string(),
        };
        assert!(matches!(ProfileSyncError::from(err), ProfileSyncError::Unreachable(_)));

        let err = BackendError::Api {
            status: 503,
            message: "down".to_string(),
        };
        assert!(matches!(UpdateError::from(err), UpdateError::Network(_)));
    }

    #[test]
    fn test_rejections_keep_backend_message() {
        let err = BackendError::Rejected("Validation failed".to_string());
        assert_eq!(
            UpdateError::from(err),
            UpdateError::Rejected("Validation failed".to_string())
        );
        assert_eq!(
            ProfileSyncError::from(BackendError::EmptyPayload),
            ProfileSyncError::Malformed("Response carried no payload".to_string())
        );
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let client = BackendClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/api/users"), "http://localhost:5000/api/users");
    }
}
