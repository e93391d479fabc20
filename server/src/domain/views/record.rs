//! Enriched span record (pipeline input)
//!
//! Produced by the upstream enrichment service. Read-only inside the
//! pipeline: generators only ever see `&EnrichedRecord`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ============================================================================
// ENRICHED ATTRIBUTE KEYS
// ============================================================================

/// Attribute keys written by the enrichment stage
pub mod keys {
    pub const SERVICE_ID: &str = "SERVICE_ID";
    pub const SERVICE_NAME: &str = "SERVICE_NAME";
    pub const CALLER_SERVICE_ID: &str = "CALLER_SERVICE_ID";
    pub const CALLER_SERVICE_NAME: &str = "CALLER_SERVICE_NAME";
    pub const API_ID: &str = "API_ID";
    pub const API_NAME: &str = "API_NAME";
    pub const API_DISCOVERY_STATE: &str = "API_DISCOVERY_STATE";
    pub const BACKEND_ID: &str = "BACKEND_ID";
    pub const BACKEND_NAME: &str = "BACKEND_NAME";
    pub const BACKEND_PROTOCOL: &str = "BACKEND_PROTOCOL";
    pub const BACKEND_HOST: &str = "BACKEND_HOST";
    pub const BACKEND_PATH: &str = "BACKEND_PATH";
    pub const PROTOCOL: &str = "PROTOCOL";
    pub const STATUS_CODE: &str = "STATUS_CODE";
    pub const ERROR_COUNT: &str = "ERROR_COUNT";
}

/// Derived tags set by the enrichment stage
pub mod tags {
    /// Span is the server side of a call into a service
    pub const ENTRY: &str = "entry";
    /// Span is the client side of a call out of a service
    pub const EXIT: &str = "exit";
    /// Span recorded an error
    pub const ERROR: &str = "error";
}

// ============================================================================
// ATTRIBUTE VALUES
// ============================================================================

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric strings are accepted since enrichers vary
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Event recorded on a span (log line, exception, annotation)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub time_ms: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Enriched span, keyed for partition affinity.
///
/// Optional identifiers distinguish "absent" (`None`) from "empty"
/// (`Some("")`): only absence makes a record malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(default)]
    pub tenant_id: String,
    /// Partition/grouping key (entity or trace id)
    pub key: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub start_time_ms: i64,
    #[serde(default)]
    pub end_time_ms: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

impl EnrichedRecord {
    /// Decode a record from its JSON wire form
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// String attribute; non-string values are ignored
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn i64_attribute(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(AttributeValue::as_i64)
    }

    /// Error count from enrichment, falling back to the `error` tag
    pub fn error_count(&self) -> i64 {
        self.i64_attribute(keys::ERROR_COUNT)
            .unwrap_or_else(|| i64::from(self.has_tag(tags::ERROR)))
    }
}
