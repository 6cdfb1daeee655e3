use serde::Serialize;
use thiserror::Error;

use crate::errors::{AuthError, ProfileSyncError};
use crate::models::{Identity, Profile};

/// Lifecycle of the session: `Unresolved → Resolving → {Authenticated | Anonymous}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Unresolved,
    Resolving,
    Authenticated,
    Anonymous,
}

/// The last failure recorded against the session, shown to the user as a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    ProfileSync(#[from] ProfileSyncError),
}

/// Snapshot published to every subscriber.
///
/// `profile` is only ever set alongside `identity`. While `loading` is true
/// both are indeterminate and views should show a spinner instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub error: Option<SessionFault>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unresolved,
            identity: None,
            profile: None,
            loading: true,
            error: None,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn is_anonymous(&self) -> bool {
        self.phase == SessionPhase::Anonymous
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }
}
