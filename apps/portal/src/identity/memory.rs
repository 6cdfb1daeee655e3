use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::identity::{ExternalProvider, IdentityProvider};
use crate::models::{DisplayInfo, Identity};

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    identity: Identity,
}

/// In-process identity provider with the same account rules as the hosted
/// one. Used for local runs and tests; it can also emulate provider-side
/// session events such as expiry.
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    next_interactive: Mutex<Option<Identity>>,
    session: watch::Sender<Option<Identity>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_interactive: Mutex::new(None),
            session,
        }
    }

    /// Registers an account without signing it in.
    pub async fn seed_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let key = normalise_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }

        let identity = Identity::new(Uuid::new_v4().simple().to_string(), Some(key.clone()));
        accounts.insert(
            key,
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        Ok(identity)
    }

    /// The identity the next interactive sign-in completes with. Without one
    /// the flow behaves as if the user closed the popup.
    pub async fn script_interactive(&self, identity: Option<Identity>) {
        *self.next_interactive.lock().await = identity;
    }

    /// Emulates the provider dropping the session (expiry, revocation).
    pub fn expire_session(&self) {
        self.session.send_replace(None);
    }

    /// Emulates the provider restoring or switching the session on its own.
    pub fn restore_session(&self, identity: Identity) {
        self.session.send_replace(Some(identity));
    }

    pub fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn publish(&self, identity: &Identity) {
        debug!(uid = %identity.uid, "Provider session changed");
        self.session.send_replace(Some(identity.clone()));
    }
}

fn normalise_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = self.seed_account(email, password).await?;
        self.publish(&identity);
        Ok(identity)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let key = normalise_email(email)?;
        let identity = {
            let accounts = self.accounts.read().await;
            match accounts.get(&key) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        self.publish(&identity);
        Ok(identity)
    }

    async fn authenticate_interactive(
        &self,
        provider: ExternalProvider,
    ) -> Result<Option<Identity>, AuthError> {
        let Some(identity) = self.next_interactive.lock().await.take() else {
            debug!(%provider, "Interactive sign-in cancelled");
            return Ok(None);
        };
        self.publish(&identity);
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.send_replace(None);
        Ok(())
    }

    async fn update_display_info(
        &self,
        identity: &Identity,
        info: &DisplayInfo,
    ) -> Result<Identity, AuthError> {
        let signed_in = self
            .current()
            .map(|current| current.uid == identity.uid)
            .unwrap_or(false);
        if !signed_in {
            return Err(AuthError::NotSignedIn);
        }

        let updated = identity.clone().with_display_info(info);
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.values_mut().find(|a| a.identity.uid == identity.uid) {
            account.identity = updated.clone();
        }
        drop(accounts);

        self.publish(&updated);
        Ok(updated)
    }

    fn session_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}
