//! Public object storage for request images.
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::ports::BackendError;

pub const IMAGE_BUCKET: &str = "machine-images";

/// Name under which a customer's image is stored: `{user_id}-{unix_millis}.{ext}`.
pub fn image_object_name(user_id: Uuid, extension: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}.{}", user_id, now.timestamp_millis(), extension)
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a new object. Existing objects are never overwritten.
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, name: &str) -> String;
}

/// Buckets as directories under a root served at `/storage`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, BackendError> {
        if !is_plain_segment(bucket) || !is_plain_segment(name) {
            return Err(BackendError::Storage(format!("Invalid object path {}/{}", bucket, name)));
        }
        Ok(self.root.join(bucket).join(name))
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let path = self.object_path(bucket, name)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| BackendError::Storage(e.to_string()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    BackendError::Conflict(format!("The resource already exists: {}", name))
                }
                _ => BackendError::Storage(e.to_string()),
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| BackendError::Storage(e.to_string()))?;

        debug!("Stored {} ({} bytes, {})", path.display(), bytes.len(), content_type);
        info!("Uploaded object {}/{}", bucket, name);
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/storage/{}/{}", self.public_base_url, bucket, name)
    }
}
