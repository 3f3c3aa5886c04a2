//! Artifact upload
//!
//! After the suite finishes the runner publishes its CPU profiles (when
//! enabled) and its log file. Keys are `<experiment>/<hostname>/<MM-DD-YYYY>_<file>`
//! so that artifacts of all workers of one experiment land side by side.

use benchfleet_client::storage::ObjectStore;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::execution::PROFILE_DIR;

/// Object key of one artifact
pub fn artifact_key(experiment: &str, hostname: &str, date: NaiveDate, file: &str) -> String {
    format!("{}/{}/{}_{}", experiment, hostname, date.format("%m-%d-%Y"), file)
}

/// Name of this machine
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

pub struct ArtifactUploader<'a> {
    store: &'a dyn ObjectStore,
    experiment: String,
    hostname: String,
    date: NaiveDate,
}

impl<'a> ArtifactUploader<'a> {
    pub fn new(store: &'a dyn ObjectStore, experiment: impl Into<String>) -> Self {
        Self {
            store,
            experiment: experiment.into(),
            hostname: hostname(),
            date: Local::now().date_naive(),
        }
    }

    #[cfg(test)]
    fn with_identity(mut self, hostname: &str, date: NaiveDate) -> Self {
        self.hostname = hostname.to_string();
        self.date = date;
        self
    }

    /// Uploads the profiles under `<project>/cpu` and the log file
    ///
    /// Failed uploads are logged and skipped. Returns the number of
    /// artifacts uploaded.
    pub async fn upload_all(&self, project: &Path, profiles: bool, log_file: &Path) -> usize {
        let mut files = Vec::new();
        if profiles {
            match profile_files(&project.join(PROFILE_DIR)).await {
                Ok(found) => files.extend(found),
                Err(e) => warn!("Could not list CPU profiles: {}", e),
            }
        }
        files.push(log_file.to_path_buf());

        let mut uploaded = 0;
        for path in &files {
            match self.upload(path).await {
                Ok(key) => {
                    uploaded += 1;
                    info!("Uploaded {} to {}", path.display(), self.store.url(&key));
                }
                Err(e) => warn!("Failed to upload {}: {:#}", path.display(), e),
            }
        }
        uploaded
    }

    async fn upload(&self, path: &Path) -> anyhow::Result<String> {
        let file = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("not a file path"))?;
        let key = artifact_key(&self.experiment, &self.hostname, self.date, file);

        let bytes = tokio::fs::read(path).await?;
        self.store.upload(bytes, &key).await?;
        Ok(key)
    }
}

async fn profile_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchfleet_client::storage::LocalObjectStore;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn test_artifact_key() {
        assert_eq!(
            artifact_key("exp4", "runner-instance-0", date(), "log.txt"),
            "exp4/runner-instance-0/03-07-2026_log.txt"
        );
    }

    #[test]
    fn test_hostname_not_empty() {
        assert!(!hostname().is_empty());
    }

    #[tokio::test]
    async fn test_upload_profiles_and_log() {
        let root = std::env::temp_dir().join(format!("benchfleet-artifacts-{}", std::process::id()));
        let project = root.join("proj");
        let profiles = project.join(PROFILE_DIR);
        tokio::fs::create_dir_all(&profiles).await.unwrap();
        tokio::fs::write(profiles.join("BenchmarkA_1_1_v1.out"), b"a").await.unwrap();
        tokio::fs::write(profiles.join("BenchmarkA_1_1_v2.out"), b"b").await.unwrap();
        let log = root.join("log.txt");
        tokio::fs::write(&log, b"log").await.unwrap();

        let store = LocalObjectStore::new(root.join("store"));
        let uploader = ArtifactUploader::new(&store, "exp").with_identity("host", date());

        assert_eq!(uploader.upload_all(&project, true, &log).await, 3);
        let stored = root.join("store/exp/host");
        assert_eq!(
            tokio::fs::read(stored.join("03-07-2026_BenchmarkA_1_1_v2.out")).await.unwrap(),
            b"b"
        );
        assert_eq!(tokio::fs::read(stored.join("03-07-2026_log.txt")).await.unwrap(), b"log");

        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let root = std::env::temp_dir().join(format!("benchfleet-no-artifacts-{}", std::process::id()));
        let store = LocalObjectStore::new(root.join("store"));
        let uploader = ArtifactUploader::new(&store, "exp").with_identity("host", date());

        let uploaded = uploader
            .upload_all(&root.join("proj"), true, &root.join("log.txt"))
            .await;
        assert_eq!(uploaded, 0);
    }
}
