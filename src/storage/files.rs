use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::{fs, io::AsyncWriteExt};

/// Files under the public directory. Keys are relative paths; the public URL of
/// a key is the key itself rooted at `/`.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    /// Like [`put`](Self::put) but fails when `key` already exists, so the
    /// caller owns the file it wrote.
    pub async fn put_new(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve_path(key)?;
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.resolve_path(key)?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn public_url(key: &str) -> String {
        format!("/{}", key.trim_start_matches('/'))
    }

    /// Inverse of [`public_url`](Self::public_url) for site-relative paths.
    /// Protocol-relative (`//host/...`) and absolute URLs are not keys.
    pub fn key_from_public_url(url: &str) -> Option<&str> {
        if !url.starts_with('/') || url.starts_with("//") {
            return None;
        }
        let key = url.trim_start_matches('/');
        let key = key.split(['?', '#']).next().unwrap_or(key);
        if key.is_empty() { None } else { Some(key) }
    }

    /// Maps a key onto the base directory, refusing anything that could
    /// escape it.
    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let normalized = key.trim_start_matches('/');
        if normalized.is_empty() {
            bail!("empty storage key");
        }
        let relative = Path::new(normalized);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!("invalid storage key: {key}");
        }
        Ok(self.base_dir.join(relative))
    }
}
