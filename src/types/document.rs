//! Input documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A short text document (typically a news article).
///
/// Immutable once handed to a pipeline. `extra` carries arbitrary
/// passthrough fields (link, publication date, source, ...) that the
/// pipelines copy onto results untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier within one pipeline run.
    pub id: String,

    /// Article title.
    #[serde(default)]
    pub title: String,

    /// Article body or description.
    #[serde(default)]
    pub body: String,

    /// Passthrough fields, preserved in insertion order.
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

impl Document {
    /// Create a new document.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            extra: IndexMap::new(),
        }
    }

    /// Create a document with a generated UUID id, for sources that carry
    /// no stable identifier of their own.
    pub fn with_generated_id(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), title, body)
    }

    /// Attach a passthrough field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the document has neither title nor body text.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builder() {
        let doc = Document::new("d1", "Title", "Body").with_field("source", "wire");

        assert_eq!(doc.id, "d1");
        assert_eq!(doc.extra.get("source").unwrap(), "wire");
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Document::with_generated_id("Title", "Body");
        let b = Document::with_generated_id("Title", "Body");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::new("d2", "  ", "");
        assert!(doc.is_empty());
    }
}
