//! Read-side helpers for views: route gating and the identity shown in the
//! navigation bar. Profile data wins over provider data when both exist.

use crate::models::Identity;
use crate::session::state::SessionState;

pub const LOGIN_PATH: &str = "/auth/login";
pub const DEFAULT_AVATAR: &str = "/default-avatar.png";

/// What a protected view should do with the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    /// Still resolving; show a spinner.
    Pending,
    Granted(&'a Identity),
    Redirect(&'static str),
}

impl SessionState {
    pub fn access(&self) -> Access<'_> {
        if self.loading {
            return Access::Pending;
        }
        match &self.identity {
            Some(identity) => Access::Granted(identity),
            None => Access::Redirect(LOGIN_PATH),
        }
    }

    pub fn display_name(&self) -> String {
        let from_profile = self.profile.as_ref().and_then(|p| non_empty(&p.display_name));
        let from_identity = self.identity.as_ref().and_then(|i| non_empty(&i.display_name));
        if let Some(name) = from_profile.or(from_identity) {
            return name.to_string();
        }

        self.identity
            .as_ref()
            .and_then(|i| non_empty(&i.email))
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }

    pub fn avatar_url(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| non_empty(&p.photo_url))
            .or_else(|| self.identity.as_ref().and_then(|i| non_empty(&i.photo_url)))
            .unwrap_or(DEFAULT_AVATAR)
    }

    pub fn contact_email(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| non_empty(&p.email))
            .or_else(|| self.identity.as_ref().and_then(|i| non_empty(&i.email)))
            .unwrap_or("")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
