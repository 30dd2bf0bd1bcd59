//! Carbon plaintext encoding of cluster health documents.
//!
//! Every top-level field of the document becomes one line of the form
//!
//! ```text
//! <namespace>.<field> <value> <unix_seconds>\n
//! ```
//!
//! Fields that carry categories rather than numbers are remapped so they can
//! be charted:
//!
//! | field | value | encoded |
//! |---|---|---|
//! | `cluster_name` | anything | `0` |
//! | `timed_out` | `true` / `false` | `1` / `0` |
//! | `status`, `cluster_status` | `green` / `yellow` / `red` | `0` / `1` / `2` |
//!
//! Anything else, including unknown status strings, is written as-is.
//!
//! ## Example
//!
//! ```rust
//! use std::time::{Duration, UNIX_EPOCH};
//! use esmetrics::LineEncoder;
//! use serde_json::json;
//!
//! let encoder = LineEncoder::new("elasticsearch.cluster");
//! let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
//! let payload = encoder.encode(&json!({"status": "yellow"}), now);
//!
//! assert_eq!(payload, "elasticsearch.cluster.status 1 1700000000\n");
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Number, Value};

use crate::HealthDocument;

/// Integral floats below this magnitude are written without a fraction.
const INTEGRAL_FLOAT_LIMIT: f64 = 1e15;

/// One metric in Carbon plaintext form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLine {
    /// Dotted metric path, `<namespace>.<field>`.
    pub path: String,
    /// The value after categorical remapping.
    pub value: String,
    /// Capture time in whole seconds since the Unix epoch.
    pub timestamp: u64,
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.path, self.value, self.timestamp)
    }
}

/// Converts health documents into Carbon plaintext payloads.
#[derive(Debug, Clone)]
pub struct LineEncoder {
    namespace: String,
}

impl LineEncoder {
    /// Create an encoder that prefixes every metric with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The configured metric prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Build one line per top-level field.
    ///
    /// A document that is not a JSON object yields no lines.
    pub fn lines(&self, doc: &HealthDocument, now: SystemTime) -> Vec<MetricLine> {
        let Value::Object(fields) = doc else {
            return Vec::new();
        };

        let timestamp = unix_seconds(now);

        fields
            .iter()
            .map(|(key, value)| MetricLine {
                path: format!("{}.{}", self.namespace, key),
                value: encode_value(key, value),
                timestamp,
            })
            .collect()
    }

    /// Encode a whole document into one newline-terminated payload.
    pub fn encode(&self, doc: &HealthDocument, now: SystemTime) -> String {
        let mut payload = String::new();
        for line in self.lines(doc, now) {
            payload.push_str(&line.to_string());
        }
        payload
    }
}

/// Encode `doc` under `namespace` stamped with `now`.
pub fn encode(doc: &HealthDocument, namespace: &str, now: SystemTime) -> String {
    LineEncoder::new(namespace).encode(doc, now)
}

/// Apply the categorical remapping for `key`, falling back to the natural rendering.
pub fn encode_value(key: &str, value: &Value) -> String {
    match (key, value) {
        ("cluster_name", _) => "0".to_string(),
        ("timed_out", Value::Bool(timed_out)) => u8::from(*timed_out).to_string(),
        ("status" | "cluster_status", Value::String(status)) => match status.as_str() {
            "green" => "0".to_string(),
            "yellow" => "1".to_string(),
            "red" => "2".to_string(),
            other => other.to_string(),
        },
        _ => render_value(value),
    }
}

/// Render a JSON value the way it should appear in a metric line.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => render_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn render_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < INTEGRAL_FLOAT_LIMIT {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}

fn unix_seconds(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
