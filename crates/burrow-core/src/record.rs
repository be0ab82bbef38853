use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// A stored mapping from a short code to the URL it stands for.
///
/// Serialized with the field names of the append-only record log:
/// `{"hash":"1111112","url":"https://example.com"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    #[serde(rename = "hash")]
    pub short_code: ShortCode,
    /// The original URL. Stored verbatim and never validated.
    #[serde(rename = "url")]
    pub original_url: String,
}

impl UrlRecord {
    pub fn new(short_code: ShortCode, original_url: impl Into<String>) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
        }
    }

    /// Returns `true` when either field is empty, as left by a partial write.
    pub fn is_incomplete(&self) -> bool {
        self.short_code.as_str().is_empty() || self.original_url.is_empty()
    }
}
