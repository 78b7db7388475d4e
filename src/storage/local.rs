//! Filesystem-backed object store. Files are served under a public base
//! URL by the HTTP server.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::ObjectStore;
use crate::error::StorageError;
use crate::nutrition::ImageRef;
use crate::vision::sniff_image_mime;

pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn extension_for(bytes: &[u8]) -> &'static str {
    match sniff_image_mime(bytes) {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, bytes: &[u8], user_id: Uuid) -> Result<ImageRef, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::UploadFailed {
                len: 0,
                reason: "empty image".into(),
            });
        }

        let storage_ref = format!("{user_id}/{}.{}", Uuid::new_v4(), extension_for(bytes));
        let path = self.root.join(&storage_ref);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), len = bytes.len(), "Image stored");

        Ok(ImageRef {
            public_url: format!("{}/{storage_ref}", self.base_url),
            storage_ref,
        })
    }
}
