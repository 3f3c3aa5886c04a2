//! Object storage
//!
//! Write-once blob uploads: the orchestrator publishes bootstrap artifacts,
//! runners publish CPU profiles and their log file.

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::{ClientError, Result};

const GCS_UPLOAD_URL: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const GCS_PUBLIC_URL: &str = "https://storage.googleapis.com";

/// A place to publish opaque blobs under string keys
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `key`, replacing any previous object
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<()>;

    /// URL under which `key` can be fetched
    fn url(&self, key: &str) -> String;
}

/// Google Cloud Storage bucket accessed through the JSON API
pub struct GcsObjectStore {
    client: Client,
    project: String,
    bucket: String,
    tokens: TokenSource,
}

impl GcsObjectStore {
    /// Creates a new GCS store
    ///
    /// # Arguments
    /// * `project` - Project billed for the requests
    /// * `bucket` - Target bucket
    /// * `tokens` - Source of bearer tokens
    pub fn new(project: impl Into<String>, bucket: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            client: Client::new(),
            project: project.into(),
            bucket: bucket.into(),
            tokens,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<()> {
        let token = self.tokens.token(&self.client).await?;
        let size = bytes.len();

        let response = self
            .client
            .post(format!("{}/{}/o", GCS_UPLOAD_URL, self.bucket))
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(token)
            .header("x-goog-user-project", &self.project)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status, body));
        }

        debug!("Uploaded {} bytes to gs://{}/{}", size, self.bucket, key);
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", GCS_PUBLIC_URL, self.bucket, key)
    }
}

/// Directory on the local filesystem, used when running without a cloud
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, bytes: Vec<u8>, key: &str) -> Result<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!("Stored {}", path.display());
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}
