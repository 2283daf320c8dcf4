//! Data models shared by the harvest stages.
//!
//! - [`Candidate`]: a raw `<loc>` value on its way to validation
//! - [`FrontierEntry`]: an accepted URL and its stable frontier index
//! - [`DiscardReason`]: why a candidate was rejected
//! - [`Item`]: the record extracted from one article page
//! - [`Page`]: what the fetch collaborator hands back

use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw URL read from a sitemap. `None` when the `<url>` had no `<loc>`.
pub type Candidate = Option<String>;

/// A validated URL and its position in the frontier file.
///
/// The index is the zero-based line number in the frontier file and never
/// changes once the line has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub index: usize,
    pub url: String,
}

/// Why a candidate URL was not admitted to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    Null,
    Invalid,
    Duplicate,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscardReason::Null => "Null",
            DiscardReason::Invalid => "Invalid",
            DiscardReason::Duplicate => "Duplicate",
        };
        f.write_str(s)
    }
}

/// A harvested article.
///
/// Serialized as `{url, title, content}` both in the per-index artifacts and
/// in the combined corpus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    /// The final URL the article was served from.
    pub url: String,
    pub title: String,
    pub content: String,
}

/// A successful response from the fetch collaborator.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_serialization_field_names() {
        let item = Item {
            url: "https://example.com/a".to_string(),
            title: "عنوان".to_string(),
            content: "Body".to_string(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["url"], "https://example.com/a");
        assert_eq!(json["title"], "عنوان");
        assert_eq!(json["content"], "Body");
    }

    #[test]
    fn test_item_deserialization() {
        let json = r#"{
            "url": "https://example.com/b",
            "title": "Title",
            "content": "Content"
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.title, "Title");
    }

    #[test]
    fn test_discard_reason_display() {
        assert_eq!(DiscardReason::Null.to_string(), "Null");
        assert_eq!(DiscardReason::Invalid.to_string(), "Invalid");
        assert_eq!(DiscardReason::Duplicate.to_string(), "Duplicate");
    }
}
