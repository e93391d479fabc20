//! View types, typed view payloads and generation results

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MalformedInputError;
use super::record::AttributeValue;

// ============================================================================
// VIEW TYPE
// ============================================================================

/// Target projection of an enriched span
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    ApiCall,
    BackendCall,
    ServiceCall,
    SpanEvent,
}

impl ViewType {
    /// Every view type, in dispatch order
    pub const ALL: [ViewType; 4] = [
        Self::ApiCall,
        Self::BackendCall,
        Self::ServiceCall,
        Self::SpanEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiCall => "api_call",
            Self::BackendCall => "backend_call",
            Self::ServiceCall => "service_call",
            Self::SpanEvent => "span_event",
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Invalid view type '{}'. Valid options: api_call, backend_call, service_call, span_event",
                    s
                )
            })
    }
}

// ============================================================================
// VIEW PAYLOADS
// ============================================================================

/// One completed call into an API of a service (entry span)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallView {
    pub tenant_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub api_id: String,
    pub api_name: Option<String>,
    pub api_discovery_state: Option<String>,
    pub operation_name: String,
    pub protocol: Option<String>,
    pub status_code: Option<i64>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    pub error_count: i64,
}

/// One call from a service out to a backend (exit span)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCallView {
    pub tenant_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub backend_id: String,
    pub backend_name: Option<String>,
    pub backend_protocol: Option<String>,
    pub backend_host: Option<String>,
    pub backend_path: Option<String>,
    pub caller_service_id: Option<String>,
    pub caller_service_name: Option<String>,
    pub operation_name: Option<String>,
    pub status_code: Option<i64>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    pub error_count: i64,
}

/// Side of the call a service-call edge was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallSide {
    Entry,
    Exit,
}

/// Caller → callee edge of the service graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCallView {
    pub tenant_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub side: CallSide,
    pub caller_service_id: Option<String>,
    pub caller_service_name: Option<String>,
    pub callee_service_id: Option<String>,
    pub callee_service_name: Option<String>,
    pub callee_backend_id: Option<String>,
    pub callee_backend_name: Option<String>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    pub error_count: i64,
}

/// One event recorded on a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEventView {
    pub tenant_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub event_index: u32,
    pub event_name: String,
    pub event_time_ms: i64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Typed payload; the variant determines the view type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view_type", content = "payload", rename_all = "snake_case")]
pub enum ViewPayload {
    ApiCall(ApiCallView),
    BackendCall(BackendCallView),
    ServiceCall(ServiceCallView),
    SpanEvent(SpanEventView),
}

impl ViewPayload {
    pub fn view_type(&self) -> ViewType {
        match self {
            Self::ApiCall(_) => ViewType::ApiCall,
            Self::BackendCall(_) => ViewType::BackendCall,
            Self::ServiceCall(_) => ViewType::ServiceCall,
            Self::SpanEvent(_) => ViewType::SpanEvent,
        }
    }
}

// ============================================================================
// VIEW RECORD
// ============================================================================

/// Schema-versioned output unit for one view type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    /// Source record key, used for partition affinity downstream
    pub key: String,
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: ViewPayload,
}

impl ViewRecord {
    pub fn view_type(&self) -> ViewType {
        self.payload.view_type()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ============================================================================
// GENERATION RESULT
// ============================================================================

/// Outcome of one generator against one record
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    /// At least one record was produced
    Produced(Vec<ViewRecord>),
    /// The record does not qualify for this view
    NotApplicable,
    /// A field required by the view's contract is absent or invalid
    Failed(MalformedInputError),
}

impl GenerationResult {
    pub fn records(&self) -> &[ViewRecord] {
        match self {
            Self::Produced(records) => records,
            _ => &[],
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ViewRecord {
        ViewRecord {
            key: "trace-1".into(),
            schema_version: 2,
            payload: ViewPayload::SpanEvent(SpanEventView {
                tenant_id: "t1".into(),
                trace_id: "aa".into(),
                span_id: "bb".into(),
                service_id: None,
                service_name: None,
                event_index: 0,
                event_name: "exception".into(),
                event_time_ms: 10,
                attributes: BTreeMap::new(),
            }),
        }
    }

    #[test]
    fn test_view_type_parse() {
        assert_eq!("api_call".parse::<ViewType>(), Ok(ViewType::ApiCall));
        assert_eq!("Span-Event".parse::<ViewType>(), Ok(ViewType::SpanEvent));
        assert!("raw_trace".parse::<ViewType>().is_err());
    }

    #[test]
    fn test_view_record_envelope() {
        let json: serde_json::Value =
            serde_json::from_slice(&sample_record().to_json().unwrap()).unwrap();
        assert_eq!(json["key"], "trace-1");
        assert_eq!(json["schema_version"], 2);
        assert_eq!(json["view_type"], "span_event");
        assert_eq!(json["payload"]["event_name"], "exception");
    }

    #[test]
    fn test_view_type_follows_payload() {
        assert_eq!(sample_record().view_type(), ViewType::SpanEvent);
    }

    #[test]
    fn test_generation_result_records() {
        assert!(GenerationResult::NotApplicable.records().is_empty());
        let produced = GenerationResult::Produced(vec![sample_record()]);
        assert!(produced.is_produced());
        assert_eq!(produced.records().len(), 1);
    }
}
