//! Service call view: caller → callee edges for the service graph
//!
//! Entry spans give `caller service → this service`. Exit spans only
//! produce an edge when the callee is a backend; calls into another
//! instrumented service are covered by that service's entry span.

use super::{duration_ms, required, str_attr};
use crate::domain::views::error::MalformedInputError;
use crate::domain::views::record::{EnrichedRecord, keys, tags};
use crate::domain::views::view::{CallSide, ServiceCallView, ViewPayload, ViewType};

const VIEW: ViewType = ViewType::ServiceCall;

pub(super) fn generate(record: &EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError> {
    let side = if record.has_tag(tags::ENTRY) && record.attribute(keys::SERVICE_ID).is_some() {
        CallSide::Entry
    } else if record.has_tag(tags::EXIT)
        && record.attribute(keys::SERVICE_ID).is_some()
        && record.attribute(keys::BACKEND_ID).is_some()
    {
        CallSide::Exit
    } else {
        return Ok(vec![]);
    };

    let trace_id = required(record.trace_id.as_ref(), VIEW, "trace_id")?;
    let span_id = required(record.span_id.as_ref(), VIEW, "span_id")?;
    let duration_ms = duration_ms(record, VIEW)?;

    let view = match side {
        CallSide::Entry => ServiceCallView {
            tenant_id: record.tenant_id.clone(),
            trace_id,
            span_id,
            side,
            caller_service_id: str_attr(record, keys::CALLER_SERVICE_ID),
            caller_service_name: str_attr(record, keys::CALLER_SERVICE_NAME),
            callee_service_id: str_attr(record, keys::SERVICE_ID),
            callee_service_name: str_attr(record, keys::SERVICE_NAME),
            callee_backend_id: None,
            callee_backend_name: None,
            start_time_ms: record.start_time_ms,
            end_time_ms: record.end_time_ms,
            duration_ms,
            error_count: record.error_count(),
        },
        CallSide::Exit => ServiceCallView {
            tenant_id: record.tenant_id.clone(),
            trace_id,
            span_id,
            side,
            caller_service_id: str_attr(record, keys::SERVICE_ID),
            caller_service_name: str_attr(record, keys::SERVICE_NAME),
            callee_service_id: None,
            callee_service_name: None,
            callee_backend_id: str_attr(record, keys::BACKEND_ID),
            callee_backend_name: str_attr(record, keys::BACKEND_NAME),
            start_time_ms: record.start_time_ms,
            end_time_ms: record.end_time_ms,
            duration_ms,
            error_count: record.error_count(),
        },
    };

    Ok(vec![ViewPayload::ServiceCall(view)])
}
