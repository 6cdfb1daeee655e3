//! Portal session layer: who is signed in, their application profile, and the
//! backend calls that hang off a signed-in session.

pub mod assets;
pub mod backend;
pub mod config;
pub mod errors;
pub mod identity;
pub mod models;
pub mod plans;
pub mod session;

pub use assets::CloudinaryUploader;
pub use backend::{BackendClient, BackendError, ProfileStore};
pub use config::Config;
pub use errors::{AuthError, ProfileSyncError, UpdateError, UploadError};
pub use identity::{ExternalProvider, IdentityProvider};
pub use session::{SessionManager, SessionPhase, SessionState};
