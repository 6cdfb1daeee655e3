use serde::{Deserialize, Serialize};

/// The identity provider's record of an authenticated user. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
            display_name: None,
            photo_url: None,
        }
    }

    /// Applies a display-info change the way the provider would.
    pub fn with_display_info(mut self, info: &DisplayInfo) -> Self {
        if let Some(name) = &info.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(url) = &info.photo_url {
            self.photo_url = Some(url.clone());
        }
        self
    }
}

/// Fields of an identity the provider lets the client change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayInfo {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl DisplayInfo {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }
}
