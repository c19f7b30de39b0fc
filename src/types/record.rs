//! Classification records.
//!
//! The field set of a classification result is rubric-defined at runtime, so
//! the record is an open, ordered map with two reserved slots: a `status` tag
//! and an optional `confidence` clamped into [0, 1].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::document::Document;

/// Outcome tag of classifying one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The gateway response parsed into a usable record.
    Ok,

    /// Parsing failed past every fallback, or the batch itself failed;
    /// the record carries declared defaults only.
    #[default]
    Failed,
}

/// The open-schema result of classifying one document against a rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Reserved status tag.
    pub status: RecordStatus,

    /// Reserved confidence slot, clamped into [0, 1] by normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Rubric-defined fields, preserved in insertion order.
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl ClassificationRecord {
    /// Create an empty successful record.
    pub fn ok() -> Self {
        Self {
            status: RecordStatus::Ok,
            confidence: None,
            fields: IndexMap::new(),
        }
    }

    /// Create a failed record carrying only the given default fields.
    pub fn failed(defaults: &IndexMap<String, Value>) -> Self {
        Self {
            status: RecordStatus::Failed,
            confidence: Some(0.0),
            fields: defaults.clone(),
        }
    }

    /// Set a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the confidence slot.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Read a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Overlay this record's fields onto its source document.
    ///
    /// Document fields (`id`, `title`, `body`, passthrough) form the base;
    /// classification fields win on key collision. Status and confidence are
    /// untouched.
    pub fn overlay_document(&mut self, doc: &Document) {
        let mut merged = IndexMap::with_capacity(doc.extra.len() + self.fields.len() + 3);
        merged.insert("id".to_string(), Value::String(doc.id.clone()));
        merged.insert("title".to_string(), Value::String(doc.title.clone()));
        merged.insert("body".to_string(), Value::String(doc.body.clone()));
        for (k, v) in &doc.extra {
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in self.fields.drain(..) {
            merged.insert(k, v);
        }
        self.fields = merged;
    }
}
