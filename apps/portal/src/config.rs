use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";
const DEFAULT_CLOUDINARY_URL: &str = "https://api.cloudinary.com";
const DEFAULT_UPLOAD_PRESET: &str = "react_unsigned";

/// Portal configuration loaded from environment variables.
/// Only the backend and logging settings have usable defaults; provider keys
/// are checked when the component that needs them is built.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub firebase_api_key: Option<String>,
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
    pub cloudinary_url: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: String,
    pub http_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("HTTP_TIMEOUT_SECS must be a whole number of seconds")?,
            None => 30,
        };

        Ok(Config {
            backend_url: or_default("BACKEND_URL", DEFAULT_BACKEND_URL),
            firebase_api_key: get("FIREBASE_API_KEY"),
            identity_toolkit_url: or_default("IDENTITY_TOOLKIT_URL", DEFAULT_IDENTITY_TOOLKIT_URL),
            secure_token_url: or_default("SECURE_TOKEN_URL", DEFAULT_SECURE_TOKEN_URL),
            cloudinary_url: or_default("CLOUDINARY_URL_BASE", DEFAULT_CLOUDINARY_URL),
            cloudinary_cloud_name: get("CLOUDINARY_CLOUD_NAME"),
            cloudinary_upload_preset: or_default("CLOUDINARY_UPLOAD_PRESET", DEFAULT_UPLOAD_PRESET),
            http_timeout: Duration::from_secs(timeout_secs),
            rust_log: or_default("RUST_LOG", "info"),
        })
    }

    pub fn require_firebase_api_key(&self) -> Result<&str> {
        self.firebase_api_key
            .as_deref()
            .context("Required environment variable 'FIREBASE_API_KEY' is not set")
    }

    pub fn require_cloudinary_cloud_name(&self) -> Result<&str> {
        self.cloudinary_cloud_name
            .as_deref()
            .context("Required environment variable 'CLOUDINARY_CLOUD_NAME' is not set")
    }
}
