mod manager;
mod state;
mod view;

pub use manager::SessionManager;
pub use state::{SessionFault, SessionPhase, SessionState};
pub use view::{Access, DEFAULT_AVATAR, LOGIN_PATH};
