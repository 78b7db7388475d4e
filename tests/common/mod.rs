//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use nutri_assist::catalog::LanguageCatalog;
use nutri_assist::channels::{ChannelAdapter, ChannelKind};
use nutri_assist::conversation::{ConversationRouter, RouterDeps};
use nutri_assist::error::{ChannelError, StorageError, VisionError};
use nutri_assist::nutrition::ImageRef;
use nutri_assist::storage::ObjectStore;
use nutri_assist::store::{Database, LibSqlBackend};
use nutri_assist::vision::{VisionAnalysis, VisionAnalyzer};

pub const DISPLAY_TEXT: &str = "🍽️ rendered analysis";

/// Channel that records every outbound message.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: bool,
    pub fail_downloads: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts sent to `recipient`, in order.
    pub async fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        if self.fail_sends {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "offline".into(),
            });
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>, ChannelError> {
        if self.fail_downloads {
            return Err(ChannelError::MediaDownloadFailed {
                name: "recording".into(),
                media_ref: media_ref.to_string(),
                reason: "gone".into(),
            });
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }
}

/// Analyzer returning a fixed payload.
pub struct StubAnalyzer {
    pub payload: Value,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubAnalyzer {
    pub fn returning(payload: Value) -> Self {
        Self {
            payload,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            payload: Value::Null,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalyzer for StubAnalyzer {
    async fn analyze(&self, _image: &[u8], _locale: &str) -> Result<VisionAnalysis, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VisionError::RequestFailed {
                provider: "stub".into(),
                reason: "model unavailable".into(),
            });
        }
        Ok(VisionAnalysis {
            display_text: DISPLAY_TEXT.to_string(),
            raw: self.payload.clone(),
            raw_text: self.payload.to_string(),
        })
    }
}

/// Object store that never touches the disk.
#[derive(Default)]
pub struct StubObjectStore {
    pub fail: bool,
}

#[async_trait]
impl ObjectStore for StubObjectStore {
    async fn upload(&self, bytes: &[u8], user_id: Uuid) -> Result<ImageRef, StorageError> {
        if self.fail {
            return Err(StorageError::UploadFailed {
                len: bytes.len(),
                reason: "bucket unavailable".into(),
            });
        }
        let storage_ref = format!("{user_id}/{}.jpg", Uuid::new_v4());
        Ok(ImageRef {
            public_url: format!("https://cdn.test/{storage_ref}"),
            storage_ref,
        })
    }
}

pub struct Harness {
    pub router: Arc<ConversationRouter>,
    pub db: Arc<dyn Database>,
    pub catalog: Arc<LanguageCatalog>,
    pub analyzer: Arc<StubAnalyzer>,
}

pub async fn harness(analyzer: StubAnalyzer) -> Harness {
    harness_with_store(analyzer, StubObjectStore::default()).await
}

pub async fn harness_with_store(analyzer: StubAnalyzer, store: StubObjectStore) -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let catalog = Arc::new(LanguageCatalog::builtin("en").unwrap());
    let analyzer = Arc::new(analyzer);
    let router = Arc::new(ConversationRouter::new(RouterDeps {
        db: Arc::clone(&db),
        catalog: Arc::clone(&catalog),
        analyzer: Arc::clone(&analyzer) as Arc<dyn VisionAnalyzer>,
        object_store: Arc::new(store),
        low_health_threshold: 5,
    }));
    Harness {
        router,
        db,
        catalog,
        analyzer,
    }
}
