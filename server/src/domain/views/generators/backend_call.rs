//! Backend call view: one record per exit span resolved to a backend entity

use super::{duration_ms, required, str_attr};
use crate::domain::views::error::MalformedInputError;
use crate::domain::views::record::{EnrichedRecord, keys, tags};
use crate::domain::views::view::{BackendCallView, ViewPayload, ViewType};

const VIEW: ViewType = ViewType::BackendCall;

pub(super) fn generate(record: &EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError> {
    if !record.has_tag(tags::EXIT) {
        return Ok(vec![]);
    }
    let Some(backend_id) = record.str_attribute(keys::BACKEND_ID) else {
        return Ok(vec![]);
    };

    let view = BackendCallView {
        tenant_id: record.tenant_id.clone(),
        trace_id: required(record.trace_id.as_ref(), VIEW, "trace_id")?,
        span_id: required(record.span_id.as_ref(), VIEW, "span_id")?,
        parent_span_id: record.parent_span_id.clone(),
        backend_id: backend_id.to_string(),
        backend_name: str_attr(record, keys::BACKEND_NAME),
        backend_protocol: str_attr(record, keys::BACKEND_PROTOCOL),
        backend_host: str_attr(record, keys::BACKEND_HOST),
        backend_path: str_attr(record, keys::BACKEND_PATH),
        caller_service_id: str_attr(record, keys::SERVICE_ID),
        caller_service_name: str_attr(record, keys::SERVICE_NAME),
        operation_name: record.operation_name.clone(),
        status_code: record.i64_attribute(keys::STATUS_CODE),
        start_time_ms: record.start_time_ms,
        end_time_ms: record.end_time_ms,
        duration_ms: duration_ms(record, VIEW)?,
        error_count: record.error_count(),
    };

    Ok(vec![ViewPayload::BackendCall(view)])
}
