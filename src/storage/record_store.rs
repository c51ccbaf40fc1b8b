use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::storage::{ImageRecord, ListFilter, compute_hash};

/// Document store holding [`ImageRecord`]s.
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn insert(&self, record: &ImageRecord) -> Result<()>;

    /// Records owned by `user_id`, newest first. An unknown user yields an
    /// empty list.
    async fn list_for_user(&self, user_id: &str, filter: &ListFilter) -> Result<Vec<ImageRecord>>;
}

/// One pretty-printed JSON document per record, grouped in a directory per
/// user (named by the hash of the user id).
#[derive(Clone, Debug)]
pub struct JsonRecordStore {
    root: PathBuf,
}

impl JsonRecordStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create record store at {}", root.display()))?;
        tracing::info!(path = %root.display(), "record store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(compute_hash(user_id.as_bytes()))
    }
}

#[async_trait]
impl ImageRepository for JsonRecordStore {
    async fn insert(&self, record: &ImageRecord) -> Result<()> {
        let dir = self.user_dir(&record.user_id);
        fs::create_dir_all(&dir).await?;

        let created_at = record.created_at.format("%Y%m%dT%H%M%S%.9fZ");
        let file_name = format!("{created_at}_{}.json", record.id);
        let final_path = dir.join(&file_name);
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let payload = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp_path, &payload)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                tracing::warn!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "failed to remove temporary record file"
                );
            }
            return Err(err).with_context(|| format!("failed to commit {}", final_path.display()));
        }
        tracing::debug!(id = %record.id, kind = %record.kind, "record inserted");
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, filter: &ListFilter) -> Result<Vec<ImageRecord>> {
        let dir_path = self.user_dir(user_id);
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let record = match serde_json::from_slice::<ImageRecord>(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable record");
                    continue;
                }
            };
            if record.user_id != user_id {
                continue;
            }
            if filter.kind.is_some_and(|kind| kind != record.kind) {
                continue;
            }
            records.push(record);
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
