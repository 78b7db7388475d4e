//! Object storage for uploaded meal images.

pub mod local;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::nutrition::ImageRef;

pub use local::LocalObjectStore;

/// Durable storage for image bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under the user's prefix and return where they live.
    async fn upload(&self, bytes: &[u8], user_id: Uuid) -> Result<ImageRef, StorageError>;
}
