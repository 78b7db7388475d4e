//! Vision model integration: turns a meal photo into an analysis payload.

pub mod openai;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::VisionError;

pub use openai::OpenAiVisionAnalyzer;

/// Output of one analysis call.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionAnalysis {
    /// Human-readable summary for the user.
    pub display_text: String,
    /// Parsed model output; shape not guaranteed.
    pub raw: Value,
    /// Model output exactly as received.
    pub raw_text: String,
}

/// Something that can look at a meal photo.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Analyze `image`, answering in `locale`.
    async fn analyze(&self, image: &[u8], locale: &str) -> Result<VisionAnalysis, VisionError>;
}

/// Best-effort MIME type from magic bytes; defaults to JPEG.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// Strip a Markdown code fence some models wrap JSON in.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
