//! View generators
//!
//! One pure function per view type. A generator returns an empty vector
//! when the record does not qualify for its view, and a
//! `MalformedInputError` only when a field its contract requires is
//! structurally absent or invalid.
//!
//! | View          | Applies to                                  | Emits        |
//! |---------------|---------------------------------------------|--------------|
//! | `api_call`    | `entry` spans with `API_ID`                 | one record   |
//! | `backend_call`| `exit` spans with `BACKEND_ID`              | one record   |
//! | `service_call`| `entry` spans with `SERVICE_ID`, backend exits | one record |
//! | `span_event`  | spans with at least one event               | one per event|

mod api_call;
mod backend_call;
mod service_call;
mod span_event;

use super::error::MalformedInputError;
use super::record::EnrichedRecord;
use super::view::{ViewPayload, ViewType};

/// Generator function value, keyed by view type in the dispatch table
pub type GenerateFn = fn(&EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError>;

/// Built-in generator for a view type
pub fn builtin(view_type: ViewType) -> GenerateFn {
    match view_type {
        ViewType::ApiCall => api_call::generate,
        ViewType::BackendCall => backend_call::generate,
        ViewType::ServiceCall => service_call::generate,
        ViewType::SpanEvent => span_event::generate,
    }
}

// ============================================================================
// SHARED FIELD ACCESS
// ============================================================================

/// Required identifier: absent is malformed, empty is accepted
fn required(
    value: Option<&String>,
    view_type: ViewType,
    field: &'static str,
) -> Result<String, MalformedInputError> {
    value
        .cloned()
        .ok_or_else(|| MalformedInputError::missing(view_type, field))
}

/// Span duration; an end before the start is malformed
fn duration_ms(record: &EnrichedRecord, view_type: ViewType) -> Result<i64, MalformedInputError> {
    if record.end_time_ms < record.start_time_ms {
        return Err(MalformedInputError::invalid(
            view_type,
            "end_time_ms",
            format!(
                "precedes start_time_ms ({} < {})",
                record.end_time_ms, record.start_time_ms
            ),
        ));
    }
    Ok(record.end_time_ms - record.start_time_ms)
}

fn str_attr(record: &EnrichedRecord, key: &str) -> Option<String> {
    record.str_attribute(key).map(str::to_string)
}
