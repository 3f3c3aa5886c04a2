//! Access tokens for the Google Cloud REST APIs

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Environment variable holding a ready-to-use bearer token
pub const TOKEN_ENV: &str = "BENCHFLEET_ACCESS_TOKEN";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Where bearer tokens come from
///
/// Tokens are resolved on every request; they are short-lived and an
/// experiment can outlast them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A fixed token
    Static(String),
    /// A credentials file: either holds an `access_token` or is handed to gcloud
    CredentialsFile(PathBuf),
    /// `gcloud auth print-access-token` with the active account
    Gcloud,
    /// The compute metadata server of the instance we run on
    Metadata,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TokenSource {
    /// Token source for an operator machine
    ///
    /// Prefers [`TOKEN_ENV`], then the given credentials file if it exists,
    /// then the local gcloud installation.
    pub fn detect(credentials: Option<&Path>) -> Self {
        if let Some(token) = token_from_env() {
            return Self::Static(token);
        }
        match credentials {
            Some(path) if path.exists() => Self::CredentialsFile(path.to_path_buf()),
            _ => Self::Gcloud,
        }
    }

    /// Token source for a process running on a compute instance
    pub fn for_instance() -> Self {
        token_from_env().map_or(Self::Metadata, Self::Static)
    }

    /// Resolve a bearer token
    pub async fn token(&self, http: &reqwest::Client) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::CredentialsFile(path) => {
                let raw = tokio::fs::read(path).await?;
                let parsed: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
                    ClientError::Auth(format!("unreadable credentials {}: {}", path.display(), e))
                })?;
                match parsed.get("access_token").and_then(|t| t.as_str()) {
                    Some(token) => Ok(token.to_string()),
                    None => gcloud_token(Some(path)).await,
                }
            }
            Self::Gcloud => gcloud_token(None).await,
            Self::Metadata => {
                let response = http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(ClientError::Auth(format!(
                        "metadata server answered {}",
                        response.status()
                    )));
                }
                let body: TokenResponse = response.json().await?;
                Ok(body.access_token)
            }
        }
    }
}

fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
}

async fn gcloud_token(credentials: Option<&Path>) -> Result<String> {
    let mut command = Command::new("gcloud");
    command.args(["auth", "print-access-token"]);
    if let Some(path) = credentials {
        command.env("CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE", path);
    }

    debug!("Requesting access token from gcloud");
    let output = command
        .output()
        .await
        .map_err(|e| ClientError::Auth(format!("failed to run gcloud: {}", e)))?;

    if !output.status.success() {
        return Err(ClientError::Auth(format!(
            "gcloud exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(ClientError::Auth("gcloud printed an empty token".to_string()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_without_credentials_file() {
        if token_from_env().is_some() {
            return;
        }
        let missing = Path::new("/nonexistent/creds.json");
        assert_eq!(TokenSource::detect(Some(missing)), TokenSource::Gcloud);
        assert_eq!(TokenSource::detect(None), TokenSource::Gcloud);
        assert_eq!(TokenSource::for_instance(), TokenSource::Metadata);
    }

    #[tokio::test]
    async fn test_credentials_file_with_access_token() {
        let path = std::env::temp_dir().join(format!("benchfleet-creds-{}.json", std::process::id()));
        tokio::fs::write(&path, br#"{"access_token": "ya29.test"}"#)
            .await
            .unwrap();

        let source = TokenSource::CredentialsFile(path.clone());
        let token = source.token(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "ya29.test");

        tokio::fs::remove_file(path).await.unwrap();
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static("abc".to_string());
        assert_eq!(source.token(&reqwest::Client::new()).await.unwrap(), "abc");
    }
}
