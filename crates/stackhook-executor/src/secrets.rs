//! File-per-repository secret bundle store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stackhook_core::{ContentHash, Result, SecretStore};
use tracing::info;

/// Stores one bundle per repository at `<dir>/<clone_url_hash>`.
///
/// Uploads are staged as `<dir>/.<clone_url_hash>.<uuid>.staged` and renamed
/// into place, so a reader sees either the old bundle or the new one.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, clone_url_hash: &ContentHash) -> PathBuf {
        self.dir.join(clone_url_hash.as_str())
    }

    fn staged_path_for(&self, clone_url_hash: &ContentHash) -> PathBuf {
        self.dir.join(format!(
            ".{}.{}.staged",
            clone_url_hash.as_str(),
            uuid::Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn locate(&self, clone_url_hash: &ContentHash) -> Result<Option<PathBuf>> {
        let path = self.path_for(clone_url_hash);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stage(&self, clone_url_hash: &ContentHash, bundle: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.staged_path_for(clone_url_hash);
        tokio::fs::write(&path, bundle).await?;
        Ok(path)
    }

    async fn promote(&self, clone_url_hash: &ContentHash, staged: &Path) -> Result<PathBuf> {
        let path = self.path_for(clone_url_hash);
        tokio::fs::rename(staged, &path).await?;
        info!(repo_hash = %clone_url_hash.short(12), "Stored secret bundle");
        Ok(path)
    }

    async fn discard(&self, staged: &Path) -> Result<()> {
        match tokio::fs::remove_file(staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
