//! Image uploads to the asset host (Cloudinary unsigned preset). The returned
//! URL is what gets stored in `photoURL` or `coverPhoto`.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::UploadError;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    error: Option<Value>,
}

pub struct CloudinaryUploader {
    client: Client,
    endpoint: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryUploader {
    pub fn new(
        base_url: &str,
        cloud_name: &str,
        upload_preset: &str,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let endpoint = format!(
            "{}/v1_1/{}/image/upload",
            base_url.trim_end_matches('/'),
            cloud_name
        );
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint,
            cloud_name: cloud_name.to_string(),
            upload_preset: upload_preset.to_string(),
        })
    }

    /// Uploads one image and returns its public HTTPS URL. Not retried.
    pub async fn upload_image(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<String, UploadError> {
        if contents.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        let size = contents.len();
        let form = Form::new()
            .part("file", Part::bytes(contents).file_name(file_name.to_string()))
            .text("upload_preset", self.upload_preset.clone())
            .text("cloud_name", self.cloud_name.clone());

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<UploadResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|r| r.error)
                .map(|e| match e {
                    Value::Object(obj) => obj
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| Value::Object(obj).to_string()),
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Image upload rejected: {message}");
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let url = parsed
            .and_then(|r| r.secure_url.or(r.url))
            .filter(|u| !u.is_empty())
            .ok_or(UploadError::MissingUrl)?;
        info!(file_name, size, "Image uploaded");
        Ok(url)
    }
}
