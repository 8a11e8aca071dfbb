//! Client for the hosted media store (Cloudinary-style API).
//!
//! Images for an event live under the folder `events/{event_no}/`. Reads go
//! through the admin search API with tags included, mutations through the
//! signed upload API. Responses are parsed into typed structs at this
//! boundary so a malformed upstream payload fails here as an upstream error
//! instead of leaking nulls into the ordering logic.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_MAX_RESULTS: u32 = 500;

/// One remote image record, tags included.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredImage {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rate limited by the image host")]
    Throttled,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Upstream(err.to_string())
    }
}

/// Operations the gallery needs from the media store.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// All images in the event's folder, with their tag sets.
    async fn search(&self, event_no: &str) -> Result<Vec<StoredImage>, StoreError>;

    /// Uploads one file into the event's folder.
    async fn upload(
        &self,
        event_no: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredImage, StoreError>;

    /// Removes one image by id.
    async fn destroy(&self, public_id: &str) -> Result<(), StoreError>;

    /// Adds a tag to the given images.
    async fn add_tag(&self, tag: &str, public_ids: &[String]) -> Result<(), StoreError>;

    /// Removes a tag from the given images.
    async fn remove_tag(&self, tag: &str, public_ids: &[String]) -> Result<(), StoreError>;
}

pub struct CloudinaryStore {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resources: Vec<StoredImage>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl CloudinaryStore {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        Self::with_base_url(
            format!("{API_BASE}/{}", config.cloud_name),
            config.cloud_api_key.clone(),
            config.cloud_api_secret.clone(),
        )
    }

    pub fn with_base_url(
        base_url: String,
        api_key: String,
        api_secret: String,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Upstream(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            api_secret,
        })
    }

    fn folder(event_no: &str) -> String {
        format!("events/{event_no}")
    }

    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Signature over the request params: keys sorted, joined `k=v&`, secret
    /// appended, SHA-256 hex encoded.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut params: Vec<_> = params.iter().collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let joined = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn check(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Image host rate limited {context}");
            return Err(StoreError::Throttled);
        }

        if !status.is_success() {
            let message = response
                .json::<ApiError>()
                .await
                .ok()
                .and_then(|body| body.error.map(|detail| detail.message))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(StoreError::Upstream(format!("{context} failed: {message}")));
        }

        Ok(response)
    }

    async fn tag_command(
        &self,
        command: &str,
        tag: &str,
        public_ids: &[String],
    ) -> Result<(), StoreError> {
        let timestamp = Self::timestamp().to_string();
        let ids = public_ids.join(",");
        let signature = self.sign(&[
            ("command", command.to_string()),
            ("public_ids", ids.clone()),
            ("tag", tag.to_string()),
            ("timestamp", timestamp.clone()),
        ]);

        let response = self
            .client
            .post(format!("{}/image/tags", self.base_url))
            .form(&[
                ("command", command),
                ("tag", tag),
                ("public_ids", ids.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        Self::check(response, "tag update").await?;
        debug!(command, tag, ids = %ids, "Applied tag command");
        Ok(())
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn search(&self, event_no: &str) -> Result<Vec<StoredImage>, StoreError> {
        let expression = format!("folder:{}/*", Self::folder(event_no));

        let response = self
            .client
            .post(format!("{}/resources/search", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .json(&json!({
                "expression": expression,
                "with_field": ["tags"],
                "max_results": SEARCH_MAX_RESULTS,
            }))
            .send()
            .await?;

        let body: SearchResponse = Self::check(response, "search").await?.json().await?;
        debug!(event_no, count = body.resources.len(), "Fetched event images");
        Ok(body.resources)
    }

    async fn upload(
        &self,
        event_no: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredImage, StoreError> {
        let folder = Self::folder(event_no);
        let timestamp = Self::timestamp().to_string();
        let signature = self.sign(&[
            ("folder", folder.clone()),
            ("timestamp", timestamp.clone()),
        ]);

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("folder", folder)
            .text("timestamp", timestamp)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(format!("{}/image/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let image: StoredImage = Self::check(response, "upload").await?.json().await?;
        debug!(event_no, public_id = %image.public_id, "Uploaded image");
        Ok(image)
    }

    async fn destroy(&self, public_id: &str) -> Result<(), StoreError> {
        let timestamp = Self::timestamp().to_string();
        let signature = self.sign(&[
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ]);

        let response = self
            .client
            .post(format!("{}/image/destroy", self.base_url))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        let body: DestroyResponse = Self::check(response, "destroy").await?.json().await?;
        if body.result == "not found" {
            return Err(StoreError::NotFound(public_id.to_string()));
        }

        debug!(public_id, "Deleted image");
        Ok(())
    }

    async fn add_tag(&self, tag: &str, public_ids: &[String]) -> Result<(), StoreError> {
        self.tag_command("add", tag, public_ids).await
    }

    async fn remove_tag(&self, tag: &str, public_ids: &[String]) -> Result<(), StoreError> {
        self.tag_command("remove", tag, public_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CloudinaryStore {
        CloudinaryStore::with_base_url(
            "https://api.example/v1_1/demo".to_string(),
            "key".to_string(),
            "secret".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn signature_is_order_independent() {
        let store = store();
        let a = store.sign(&[
            ("timestamp", "1700000000".to_string()),
            ("folder", "events/007".to_string()),
        ]);
        let b = store.sign(&[
            ("folder", "events/007".to_string()),
            ("timestamp", "1700000000".to_string()),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_depends_on_secret() {
        let a = store();
        let b = CloudinaryStore::with_base_url(
            "https://api.example/v1_1/demo".to_string(),
            "key".to_string(),
            "other-secret".to_string(),
        )
        .unwrap();

        let params = [("timestamp", "1700000000".to_string())];
        assert_ne!(a.sign(&params), b.sign(&params));
    }

    #[test]
    fn search_response_parses_with_and_without_tags() {
        let body = r#"{
            "total_count": 2,
            "resources": [
                { "public_id": "events/007/a", "secure_url": "https://cdn/a.jpg", "tags": ["order_0"] },
                { "public_id": "events/007/b", "secure_url": "https://cdn/b.jpg" }
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(parsed.resources[0].tags, ["order_0"]);
        assert!(parsed.resources[1].tags.is_empty());
    }

    #[test]
    fn search_response_without_resources_is_empty() {
        let parsed: SearchResponse = serde_json::from_str(r#"{ "total_count": 0 }"#).unwrap();
        assert!(parsed.resources.is_empty());
    }

    #[test]
    fn malformed_resource_fails_to_parse() {
        // Missing secure_url must be a parse error, not a blank field.
        let body = r#"{ "resources": [ { "public_id": "events/007/a" } ] }"#;
        assert!(serde_json::from_str::<SearchResponse>(body).is_err());
    }
}
