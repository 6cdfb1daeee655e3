//! Identity providers: the external authority for "who is signed in".
//!
//! The session manager consumes a provider through the `IdentityProvider`
//! trait and never looks at tokens. Two backends ship with the crate:
//! `FirebaseIdentityProvider` (REST) and `MemoryIdentityProvider` (in-process).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::AuthError;
use crate::models::{DisplayInfo, Identity};

pub mod firebase;
pub mod memory;

pub use firebase::{FirebaseIdentityProvider, PresetCredentialFlow};
pub use memory::MemoryIdentityProvider;

/// Third-party sign-in providers reachable through an interactive flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalProvider {
    Google,
    Github,
}

impl ExternalProvider {
    /// Provider id as the identity service names it.
    pub fn provider_id(self) -> &'static str {
        match self {
            ExternalProvider::Google => "google.com",
            ExternalProvider::Github => "github.com",
        }
    }
}

impl fmt::Display for ExternalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_id())
    }
}

/// Credential handed back by a completed interactive flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpCredential {
    IdToken(String),
    AccessToken(String),
}

/// The popup/redirect part of an external sign-in. `Ok(None)` means the user
/// closed or cancelled the flow.
#[async_trait]
pub trait InteractiveFlow: Send + Sync {
    async fn run(&self, provider: ExternalProvider) -> Result<Option<IdpCredential>, AuthError>;
}

/// Contract of the external identity provider.
///
/// Implementations publish the current identity on the `session_changes`
/// channel whenever it changes, including changes they originate themselves
/// (sign-in, sign-out, token renewal, expiry).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// `Ok(None)` when the user cancels the flow.
    async fn authenticate_interactive(
        &self,
        provider: ExternalProvider,
    ) -> Result<Option<Identity>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn update_display_info(
        &self,
        identity: &Identity,
        info: &DisplayInfo,
    ) -> Result<Identity, AuthError>;

    /// Receiver whose current value is the signed-in identity, if any.
    fn session_changes(&self) -> watch::Receiver<Option<Identity>>;
}
