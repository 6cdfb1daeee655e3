use async_trait::async_trait;
use tracing::debug;

use crate::backend::{BackendClient, Payload};
use crate::errors::{ProfileSyncError, UpdateError};
use crate::models::{NewProfile, Profile, ProfilePatch};

/// Where application profiles live. The session manager only talks to the
/// backend through this trait, so tests can swap in a controllable store.
///
/// Carried by the session manager as `Arc<dyn ProfileStore>`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `POST /api/users`: creates (or upserts) the profile for a fresh identity.
    async fn create_profile(&self, record: &NewProfile) -> Result<Profile, ProfileSyncError>;

    /// `GET /api/users/:uid`
    async fn fetch_profile(&self, uid: &str) -> Result<Profile, ProfileSyncError>;

    /// `PUT /api/users/:uid`: returns the server's full representation after the update.
    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<Profile, UpdateError>;
}

#[async_trait]
impl ProfileStore for BackendClient {
    async fn create_profile(&self, record: &NewProfile) -> Result<Profile, ProfileSyncError> {
        debug!(uid = %record.uid, "Saving profile to backend");
        let req = self.client.post(self.url("/api/users")).json(record);
        Ok(self.call(req, Payload::User).await?)
    }

    async fn fetch_profile(&self, uid: &str) -> Result<Profile, ProfileSyncError> {
        debug!(uid, "Fetching profile from backend");
        let req = self.client.get(self.url(&format!("/api/users/{uid}")));
        Ok(self.call(req, Payload::User).await?)
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<Profile, UpdateError> {
        debug!(uid, "Updating profile on backend");
        let req = self
            .client
            .put(self.url(&format!("/api/users/{uid}")))
            .json(patch);
        Ok(self.call(req, Payload::User).await?)
    }
}
