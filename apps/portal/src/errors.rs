use thiserror::Error;

/// Identity-provider failures. Fatal to the requested operation and surfaced
/// to the caller; the session manager never retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("This account has been disabled")]
    UserDisabled,

    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Identity provider unreachable: {0}")]
    Network(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Session manager has shut down")]
    SessionClosed,
}

/// Profile synchronisation failures. Never fatal: the session stays
/// authenticated and the profile degrades to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileSyncError {
    #[error("Profile backend unreachable: {0}")]
    Unreachable(String),

    #[error("Profile backend rejected the request: {0}")]
    Rejected(String),

    #[error("Profile backend returned an unreadable response: {0}")]
    Malformed(String),
}

/// Profile save failures. The cached profile is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("Profile backend unreachable: {0}")]
    Network(String),

    #[error("Profile update rejected: {0}")]
    Rejected(String),

    #[error("Profile backend returned an unreadable response: {0}")]
    Malformed(String),

    #[error("Session manager has shut down")]
    SessionClosed,
}

/// Asset-host upload failures. Uploads are not retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Nothing to upload")]
    EmptyFile,

    #[error("Asset host unreachable: {0}")]
    Network(String),

    #[error("Asset host rejected the upload (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Asset host response did not include a URL")]
    MissingUrl,
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Network(e.to_string())
    }
}
