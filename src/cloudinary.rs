use crate::http::build_client;
use crate::models::PictureUpload;
use chrono::Utc;
use once_cell::sync::Lazy;
use reqwest::{Client, multipart};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::env;
use thiserror::Error;
use tracing::debug;

static UPLOAD_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("CLOUDINARY_UPLOAD_ROOT")
        .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string())
});

#[derive(Debug, Error)]
pub enum CloudinaryError {
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("invalid upload response: {0}")]
    Deserialize(String),
}

/// Signed-upload client for the Cloudinary image API.
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryClient {
    pub fn from_env() -> Option<Self> {
        let cloud_name = env::var("CLOUDINARY_CLOUD_NAME").ok()?;
        let api_key = env::var("CLOUDINARY_API_KEY").ok()?;
        let api_secret = env::var("CLOUDINARY_API_SECRET").ok()?;
        Some(Self {
            cloud_name,
            api_key,
            api_secret,
            http: build_client(),
        })
    }

    /// Upload one picture and return its delivery URL.
    pub async fn upload(&self, picture: &PictureUpload) -> Result<String, CloudinaryError> {
        let timestamp = Utc::now().timestamp();
        let signature = sign(&format!("timestamp={timestamp}"), &self.api_secret);

        let part = multipart::Part::bytes(picture.bytes.clone())
            .file_name(picture.file_name.clone())
            .mime_str(&picture.content_type)
            .map_err(|err| CloudinaryError::Request(err.to_string()))?;
        let form = multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", part);

        let url = format!("{}/{}/image/upload", UPLOAD_ROOT.as_str(), self.cloud_name);
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| CloudinaryError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CloudinaryError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|err| CloudinaryError::Deserialize(err.to_string()))?;
        debug!(
            target = "market.cloudinary",
            file = %picture.file_name,
            "picture uploaded",
        );
        Ok(payload.secure_url)
    }
}

// Cloudinary signs the sorted parameter string with the API secret appended.
fn sign(params: &str, secret: &str) -> String {
    let digest = Sha256::digest(format!("{params}{secret}").as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
