use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Write-only sink for successful analyses.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save_analysis(&self, text: &str, at: DateTime<Utc>) -> Result<PathBuf, StoreError>;
}

/// `analysis_<unix-seconds>.txt`
pub fn analysis_file_name(at: DateTime<Utc>) -> String {
    format!("analysis_{}.txt", at.timestamp())
}

// STORAGE MANAGER

pub struct ResultStore {
    // Directory analysis logs are written into (e.g. "logs")
    pub base_dir: PathBuf,
}

impl ResultStore {
    /// The directory is created on first write, so a store can be built before
    /// the filesystem is ready.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl AnalysisStore for ResultStore {
    /// One file per successful analysis. An existing file for the same second is
    /// left untouched and reported as [`StoreError::AlreadyExists`].
    async fn save_analysis(&self, text: &str, at: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.base_dir).await?;

        let file_name = analysis_file_name(at);
        let final_path = self.base_dir.join(&file_name);
        if fs::try_exists(&final_path).await? {
            return Err(StoreError::AlreadyExists(final_path));
        }

        // Write to a .tmp file first so a crash mid-write never leaves a
        // truncated analysis behind.
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));
        fs::write(&tmp_path, text.as_bytes()).await?;
        fs::rename(&tmp_path, &final_path).await?;

        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn writes_one_file_per_second() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("logs"));

        let first = store.save_analysis("bullish", at(1_700_000_000)).await.unwrap();
        let second = store.save_analysis("bearish", at(1_700_000_001)).await.unwrap();

        assert_eq!(first, dir.path().join("logs/analysis_1700000000.txt"));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "bullish");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "bearish");
        assert_eq!(std::fs::read_dir(dir.path().join("logs")).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn never_overwrites_an_existing_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());

        store.save_analysis("first", at(5)).await.unwrap();
        let err = store.save_analysis("second", at(5)).await.unwrap_err();

        assert!(matches!(err, StoreError::AlreadyExists(_)));
        let kept = std::fs::read_to_string(dir.path().join("analysis_5.txt")).unwrap();
        assert_eq!(kept, "first");
    }

    #[tokio::test]
    async fn unwritable_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = ResultStore::new(&blocker);
        let err = store.save_analysis("text", at(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
