//! Firebase Authentication over its REST API.
//!
//! Email/password and IdP sign-in go through the Identity Toolkit
//! `accounts:*` endpoints; token renewal goes through the Secure Token
//! service. Tokens stay inside the provider; only the `Identity` leaves it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::errors::AuthError;
use crate::identity::{ExternalProvider, IdentityProvider, IdpCredential, InteractiveFlow};
use crate::models::{DisplayInfo, Identity};

const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Debug, Clone)]
struct Tokens {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: &'static str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl AccountResponse {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone().filter(|s| !s.is_empty()),
            photo_url: self.photo_url.clone().filter(|s| !s.is_empty()),
        }
    }

    fn tokens(&self) -> Option<Tokens> {
        Some(Tokens {
            id_token: self.id_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }
}

/// Maps an Identity Toolkit error message (`CODE` or `CODE : detail`) to `AuthError`.
pub fn map_error_code(message: &str) -> AuthError {
    let (code, detail) = match message.split_once(':') {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };

    match code {
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
        | "INVALID_IDP_RESPONSE" => AuthError::InvalidCredentials,
        "WEAK_PASSWORD" if detail.is_empty() => {
            AuthError::WeakPassword("Password should be at least 6 characters".to_string())
        }
        "WEAK_PASSWORD" => AuthError::WeakPassword(detail.to_string()),
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "USER_NOT_FOUND" | "INVALID_REFRESH_TOKEN"
        | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => AuthError::NotSignedIn,
        _ => AuthError::Provider(message.to_string()),
    }
}

/// Interactive flow that completes with a credential obtained elsewhere
/// (for example an ID token pasted on the command line). It can be used once;
/// afterwards it behaves like a cancelled popup.
pub struct PresetCredentialFlow {
    credential: Mutex<Option<IdpCredential>>,
}

impl PresetCredentialFlow {
    pub fn new(credential: Option<IdpCredential>) -> Self {
        Self {
            credential: Mutex::new(credential),
        }
    }
}

#[async_trait]
impl InteractiveFlow for PresetCredentialFlow {
    async fn run(&self, _provider: ExternalProvider) -> Result<Option<IdpCredential>, AuthError> {
        Ok(self.credential.lock().await.take())
    }
}

pub struct FirebaseIdentityProvider {
    client: Client,
    api_key: String,
    toolkit_url: String,
    token_url: String,
    interactive: Option<Arc<dyn InteractiveFlow>>,
    tokens: RwLock<Option<Tokens>>,
    session: watch::Sender<Option<Identity>>,
}

impl FirebaseIdentityProvider {
    pub fn new(
        api_key: &str,
        toolkit_url: &str,
        token_url: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        let (session, _) = watch::channel(None);

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            toolkit_url: toolkit_url.trim_end_matches('/').to_string(),
            token_url: token_url.trim_end_matches('/').to_string(),
            interactive: None,
            tokens: RwLock::new(None),
            session,
        })
    }

    pub fn with_interactive_flow(mut self, flow: Arc<dyn InteractiveFlow>) -> Self {
        self.interactive = Some(flow);
        self
    }

    /// Current ID token, for callers that need to present it to a backend.
    pub async fn id_token(&self) -> Option<String> {
        self.tokens.read().await.as_ref().map(|t| t.id_token.clone())
    }

    /// Exchanges the refresh token for a new ID token. The refreshed identity
    /// is republished; a refresh the provider refuses ends the session.
    pub async fn refresh_session(&self) -> Result<Identity, AuthError> {
        let current = self.session.borrow().clone().ok_or(AuthError::NotSignedIn)?;
        let refresh_token = self
            .tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or(AuthError::NotSignedIn)?;

        let url = format!("{}/v1/token?key={}", self.token_url, self.api_key);
        let request = self.client.post(url).form(&RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &refresh_token,
        });

        let response: RefreshResponse = match self.execute(request).await {
            Ok(response) => response,
            Err(AuthError::NotSignedIn) => {
                warn!(uid = %current.uid, "Refresh token rejected, ending session");
                self.clear_session().await;
                return Err(AuthError::NotSignedIn);
            }
            Err(e) => return Err(e),
        };

        if response.user_id != current.uid {
            return Err(AuthError::Provider(format!(
                "token refresh returned a different user ({})",
                response.user_id
            )));
        }

        *self.tokens.write().await = Some(Tokens {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        });
        debug!(uid = %current.uid, "Session token renewed");
        self.session.send_replace(Some(current.clone()));
        Ok(current)
    }

    fn account_url(&self, action: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.toolkit_url, action, self.api_key)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            if status.is_server_error() {
                return Err(AuthError::Network(format!("status {status}: {message}")));
            }
            return Err(map_error_code(&message));
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Provider(e.to_string()))
    }

    async fn account_call<B: Serialize>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<AccountResponse, AuthError> {
        let request = self.client.post(self.account_url(action)).json(body);
        self.execute(request).await
    }

    async fn start_session(&self, account: &AccountResponse) -> Identity {
        let identity = account.identity();
        *self.tokens.write().await = account.tokens();
        info!(uid = %identity.uid, "Signed in");
        self.session.send_replace(Some(identity.clone()));
        identity
    }

    async fn clear_session(&self) {
        *self.tokens.write().await = None;
        self.session.send_replace(None);
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let account = self.account_call("signUp", &body).await?;
        Ok(self.start_session(&account).await)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let account = self.account_call("signInWithPassword", &body).await?;
        Ok(self.start_session(&account).await)
    }

    async fn authenticate_interactive(
        &self,
        provider: ExternalProvider,
    ) -> Result<Option<Identity>, AuthError> {
        let flow = self.interactive.as_ref().ok_or_else(|| {
            AuthError::Provider(format!("no interactive flow configured for {provider}"))
        })?;

        let Some(credential) = flow.run(provider).await? else {
            info!(%provider, "Interactive sign-in cancelled by user");
            return Ok(None);
        };

        let post_body = match credential {
            IdpCredential::IdToken(token) => format!("id_token={token}&providerId={provider}"),
            IdpCredential::AccessToken(token) => {
                format!("access_token={token}&providerId={provider}")
            }
        };
        let body = IdpRequest {
            post_body,
            request_uri: IDP_REQUEST_URI,
            return_idp_credential: true,
            return_secure_token: true,
        };
        let account = self.account_call("signInWithIdp", &body).await?;
        Ok(Some(self.start_session(&account).await))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.clear_session().await;
        info!("Signed out");
        Ok(())
    }

    async fn update_display_info(
        &self,
        identity: &Identity,
        info: &DisplayInfo,
    ) -> Result<Identity, AuthError> {
        let id_token = self.id_token().await.ok_or(AuthError::NotSignedIn)?;
        let body = UpdateRequest {
            id_token: &id_token,
            display_name: info.display_name.as_deref(),
            photo_url: info.photo_url.as_deref(),
            return_secure_token: true,
        };
        let account = self.account_call("update", &body).await?;

        if let Some(tokens) = account.tokens() {
            *self.tokens.write().await = Some(tokens);
        }
        let updated = Identity {
            uid: identity.uid.clone(),
            ..account.identity()
        };
        self.session.send_replace(Some(updated.clone()));
        Ok(updated)
    }

    fn session_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}
