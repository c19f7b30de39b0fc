//! Tolerant parsing of LLM responses into classification records.
//!
//! The AI gateway is not contractually obligated to return clean JSON, so
//! parsing is an ordered fallback chain, each stage attempted only when the
//! previous one fails:
//!
//! 1. strip fenced code-block markers,
//! 2. strict JSON parse of the text as-is,
//! 3. strict parse of the outermost balanced `{...}` / `[...]` slice,
//! 4. (batched only) scan for every balanced-brace object and parse each,
//! 5. degrade to a `Failed` default record.
//!
//! Every successfully parsed object then passes through normalization:
//! case-folded keys mapped via the caller's alias table, numeric clamps,
//! list truncation, and defaults for missing required keys. Normalization
//! is idempotent, so re-parsing a serialized record yields the same record.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::config::NormalizerConfig;
use crate::types::record::{ClassificationRecord, RecordStatus};

/// Data-quality signals from one parse call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Records recovered through a stage past the strict parse.
    pub fallbacks: usize,

    /// Records degraded to `Failed` defaults.
    pub failed: usize,

    /// Surplus array elements truncated from the front-aligned result.
    pub overflow: usize,

    /// Missing array elements padded with `Failed` defaults at the tail.
    pub underflow: usize,
}

impl ParseReport {
    /// Whether the response length disagreed with the expected count.
    pub fn count_mismatch(&self) -> bool {
        self.overflow > 0 || self.underflow > 0
    }
}

/// Parse a single-document response. Total: the worst case is a record
/// tagged `Failed` carrying the declared defaults.
pub fn parse_one(text: &str, config: &NormalizerConfig) -> ClassificationRecord {
    let (record, _report) = parse_one_reported(text, config);
    record
}

/// As [`parse_one`], also returning the data-quality report.
pub fn parse_one_reported(
    text: &str,
    config: &NormalizerConfig,
) -> (ClassificationRecord, ParseReport) {
    let mut report = ParseReport::default();
    let stripped = strip_code_fences(text);

    let object = parse_strict_object(&stripped).or_else(|| {
        report.fallbacks += 1;
        outermost_slice(&stripped, '{', '}').and_then(|s| parse_strict_object(s))
    });

    let record = match object {
        Some(map) => normalize_object(map, config),
        None => {
            warn!("response unparseable past every stage, using failed default");
            report.failed += 1;
            ClassificationRecord::failed(&config.defaults)
        }
    };
    (record, report)
}

/// Parse a batch response into exactly `expected` records.
///
/// Count reconciliation is positional best-effort: surplus elements are
/// truncated from the front-aligned result and deficits are padded at the
/// tail with `Failed` defaults. The gateway does not guarantee positional
/// correspondence, so any mismatch is surfaced in the report rather than
/// silently absorbed.
pub fn parse_many(
    text: &str,
    expected: usize,
    config: &NormalizerConfig,
) -> (Vec<ClassificationRecord>, ParseReport) {
    let mut report = ParseReport::default();
    let stripped = strip_code_fences(text);

    let elements = parse_strict_array(&stripped)
        .or_else(|| {
            report.fallbacks += 1;
            outermost_slice(&stripped, '[', ']').and_then(|s| parse_strict_array(s))
        })
        .or_else(|| {
            let objects = scan_balanced_objects(&stripped);
            if objects.is_empty() {
                None
            } else {
                debug!(count = objects.len(), "recovered objects by brace scan");
                Some(objects.into_iter().map(Value::Object).collect())
            }
        })
        .unwrap_or_default();

    let mut records: Vec<ClassificationRecord> = elements
        .into_iter()
        .map(|element| match element {
            Value::Object(map) => normalize_object(map, config),
            other => {
                warn!(kind = value_kind(&other), "non-object batch element");
                report.failed += 1;
                ClassificationRecord::failed(&config.defaults)
            }
        })
        .collect();

    if records.len() > expected {
        report.overflow = records.len() - expected;
        warn!(
            expected,
            got = records.len(),
            "batch response overflow, truncating to front"
        );
        records.truncate(expected);
    } else if records.len() < expected {
        report.underflow = expected - records.len();
        warn!(
            expected,
            got = records.len(),
            "batch response underflow, padding tail with failed defaults"
        );
        while records.len() < expected {
            report.failed += 1;
            records.push(ClassificationRecord::failed(&config.defaults));
        }
    }

    (records, report)
}

/// Strip fenced code-block markers, keeping the fenced payload.
fn strip_code_fences(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex is valid")
    });

    // Prefer the first fenced block that contains bracketed content.
    for captures in fence.captures_iter(text) {
        let payload = captures[1].trim();
        if payload.contains('{') || payload.contains('[') {
            return payload.to_string();
        }
    }
    text.trim().to_string()
}

fn parse_strict_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_strict_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(values)) => Some(values),
        // A bare object in batched mode is a one-element batch.
        Ok(Value::Object(map)) => Some(vec![Value::Object(map)]),
        _ => None,
    }
}

/// Slice the outermost balanced pair, e.g. `{...}` buried in commentary.
fn outermost_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Scan for every top-level balanced `{...}` object, string-aware.
fn scan_balanced_objects(text: &str) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(map) = parse_strict_object(&text[start..=i]) {
                            objects.push(map);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    objects
}

/// Normalize one parsed JSON object into a record.
fn normalize_object(map: Map<String, Value>, config: &NormalizerConfig) -> ClassificationRecord {
    let mut record = ClassificationRecord::ok();

    for (raw_key, value) in map {
        let folded = raw_key.trim().to_lowercase();
        let key = config
            .key_aliases
            .get(&folded)
            .cloned()
            .unwrap_or(folded);

        match key.as_str() {
            // Reserved slots: the parser owns `status`, and `confidence`
            // gets its own clamp.
            "status" => {}
            "confidence" => {
                record.confidence = Some(normalize_confidence(&value, config));
            }
            _ => {
                let value = normalize_value(&key, value, config);
                record.fields.insert(key, value);
            }
        }
    }

    for (key, default) in &config.defaults {
        if !record.fields.contains_key(key) {
            record.fields.insert(key.clone(), default.clone());
        }
    }

    record.status = RecordStatus::Ok;
    record
}

fn normalize_confidence(value: &Value, config: &NormalizerConfig) -> f64 {
    match value.as_f64() {
        Some(n) if n.is_finite() => n.clamp(0.0, 1.0),
        _ => config.default_confidence.clamp(0.0, 1.0),
    }
}

fn normalize_value(key: &str, value: Value, config: &NormalizerConfig) -> Value {
    match value {
        Value::Number(n) => {
            if let Some((min, max)) = config.numeric_ranges.get(key) {
                let raw = n.as_f64().filter(|f| f.is_finite()).unwrap_or(*min);
                Value::from(raw.clamp(*min, *max))
            } else {
                Value::Number(n)
            }
        }
        Value::Array(mut items) => {
            if let Some(&cap) = config.list_caps.get(key) {
                items.truncate(cap);
            }
            Value::Array(items)
        }
        Value::String(s) => {
            let canonical = config
                .value_aliases
                .get(key)
                .and_then(|aliases| aliases.get(&s))
                .cloned()
                .unwrap_or(s);
            Value::String(canonical)
        }
        other => other,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> NormalizerConfig {
        NormalizerConfig::new()
            .with_key_alias("Category", "category")
            .with_key_alias("catagory", "category")
            .with_value_alias("category", "company mention", "company")
            .with_list_cap("keywords", 3)
            .with_default("category", "other")
            .with_default("keywords", json!([]))
    }

    #[test]
    fn test_parse_clean_object() {
        let record = parse_one(
            r#"{"category": "industry", "confidence": 0.8, "keywords": ["a"]}"#,
            &config(),
        );
        assert_eq!(record.status, RecordStatus::Ok);
        assert_eq!(record.get("category").unwrap(), "industry");
        assert_eq!(record.confidence, Some(0.8));
    }

    #[test]
    fn test_parse_fenced_and_commented_object() {
        let text = "Sure! Here is the analysis you asked for:\n\
                    ```json\n{\"category\": \"industry\", \"confidence\": 0.7}\n```\n\
                    Let me know if you need anything else.";
        let record = parse_one(text, &config());
        assert_eq!(record.status, RecordStatus::Ok);
        assert_eq!(record.get("category").unwrap(), "industry");
    }

    #[test]
    fn test_parse_object_buried_in_prose() {
        let text = "The article is about cosmetics. {\"category\": \"industry\"} Hope that helps.";
        let record = parse_one(text, &config());
        assert_eq!(record.get("category").unwrap(), "industry");
    }

    #[test]
    fn test_unparseable_becomes_failed_default() {
        let record = parse_one("no json anywhere", &config());
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.confidence, Some(0.0));
        assert_eq!(record.get("category").unwrap(), "other");
    }

    #[test]
    fn test_parse_one_is_idempotent() {
        let record = parse_one(
            r#"{"Category": "company mention", "confidence": 1.7, "keywords": ["a","b","c","d"]}"#,
            &config(),
        );
        // Alias folded, confidence clamped, list capped.
        assert_eq!(record.get("category").unwrap(), "company");
        assert_eq!(record.confidence, Some(1.0));
        assert_eq!(record.get("keywords").unwrap().as_array().unwrap().len(), 3);

        let serialized = serde_json::to_string(&record).unwrap();
        let reparsed = parse_one(&serialized, &config());
        assert_eq!(reparsed.fields, record.fields);
        assert_eq!(reparsed.confidence, record.confidence);
        assert_eq!(reparsed.status, RecordStatus::Ok);
    }

    #[test]
    fn test_declared_numeric_range_clamps() {
        let config = config().with_numeric_range("importance", 1.0, 5.0);

        let high = parse_one(r#"{"importance": 9, "rank": 9}"#, &config);
        assert_eq!(high.get("importance").unwrap(), 5.0);
        // Fields without a declared range pass through untouched.
        assert_eq!(high.get("rank").unwrap(), 9);

        let low = parse_one(r#"{"importance": -3.5}"#, &config);
        assert_eq!(low.get("importance").unwrap(), 1.0);
    }

    #[test]
    fn test_non_numeric_confidence_uses_default() {
        let record = parse_one(r#"{"confidence": "high"}"#, &config());
        assert_eq!(record.confidence, Some(0.5));
    }

    #[test]
    fn test_parse_many_exact() {
        let text = r#"[{"category":"a"},{"category":"b"},{"category":"c"}]"#;
        let (records, report) = parse_many(text, 3, &config());
        assert_eq!(records.len(), 3);
        assert!(!report.count_mismatch());
        assert_eq!(records[1].get("category").unwrap(), "b");
    }

    #[test]
    fn test_parse_many_overflow_truncates_front() {
        let elements: Vec<String> = (0..10).map(|i| format!(r#"{{"idx":{i}}}"#)).collect();
        let text = format!("[{}]", elements.join(","));

        let (records, report) = parse_many(&text, 8, &config());
        assert_eq!(records.len(), 8);
        assert_eq!(report.overflow, 2);
        assert_eq!(records[7].get("idx").unwrap(), 7);
    }

    #[test]
    fn test_parse_many_underflow_pads_tail() {
        let elements: Vec<String> = (0..6).map(|i| format!(r#"{{"idx":{i}}}"#)).collect();
        let text = format!("[{}]", elements.join(","));

        let (records, report) = parse_many(&text, 8, &config());
        assert_eq!(records.len(), 8);
        assert_eq!(report.underflow, 2);
        assert_eq!(records[5].status, RecordStatus::Ok);
        assert_eq!(records[6].status, RecordStatus::Failed);
        assert_eq!(records[7].status, RecordStatus::Failed);
    }

    #[test]
    fn test_parse_many_brace_scan_recovery() {
        // Broken array syntax, but individual objects are intact.
        let text = "result 1: {\"idx\": 0} and result 2: {\"idx\": 1}";
        let (records, report) = parse_many(text, 2, &config());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("idx").unwrap(), 0);
        assert_eq!(records[1].get("idx").unwrap(), 1);
        assert!(report.fallbacks >= 1);
    }

    #[test]
    fn test_brace_scan_ignores_braces_in_strings() {
        let text = r#"{"note": "contains } brace"} {"idx": 1}"#;
        let objects = scan_balanced_objects(text);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["note"], "contains } brace");
    }

    #[test]
    fn test_parse_many_single_object_wrapped() {
        let (records, report) = parse_many(r#"{"category":"a"}"#, 1, &config());
        assert_eq!(records.len(), 1);
        assert!(!report.count_mismatch());
    }

    #[test]
    fn test_garbage_batch_all_failed() {
        let (records, report) = parse_many("total nonsense", 4, &config());
        assert_eq!(records.len(), 4);
        assert_eq!(report.failed, 4);
        assert!(records.iter().all(|r| r.status == RecordStatus::Failed));
    }
}
