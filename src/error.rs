//! Error types for Nutri Assist.

/// Error returned from the conversation entry point.
///
/// Analyzer and upload failures are answered in-conversation and never
/// surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download media {media_ref} on channel {name}: {reason}")]
    MediaDownloadFailed {
        name: String,
        media_ref: String,
        reason: String,
    },

    #[error("Media {media_ref} on channel {name} was empty")]
    EmptyMedia { name: String, media_ref: String },
}

/// Vision-model analysis errors.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Object-storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload of {len} bytes failed: {reason}")]
    UploadFailed { len: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
