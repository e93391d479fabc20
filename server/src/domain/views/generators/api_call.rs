//! API call view: one record per completed entry span into a known API

use super::{duration_ms, required, str_attr};
use crate::domain::views::error::MalformedInputError;
use crate::domain::views::record::{EnrichedRecord, keys, tags};
use crate::domain::views::view::{ApiCallView, ViewPayload, ViewType};

const VIEW: ViewType = ViewType::ApiCall;

pub(super) fn generate(record: &EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError> {
    if !record.has_tag(tags::ENTRY) {
        return Ok(vec![]);
    }
    let Some(api_id) = record.str_attribute(keys::API_ID) else {
        return Ok(vec![]);
    };

    let view = ApiCallView {
        tenant_id: record.tenant_id.clone(),
        trace_id: required(record.trace_id.as_ref(), VIEW, "trace_id")?,
        span_id: required(record.span_id.as_ref(), VIEW, "span_id")?,
        parent_span_id: record.parent_span_id.clone(),
        service_id: str_attr(record, keys::SERVICE_ID),
        service_name: str_attr(record, keys::SERVICE_NAME),
        api_id: api_id.to_string(),
        api_name: str_attr(record, keys::API_NAME),
        api_discovery_state: str_attr(record, keys::API_DISCOVERY_STATE),
        operation_name: required(record.operation_name.as_ref(), VIEW, "operation_name")?,
        protocol: str_attr(record, keys::PROTOCOL),
        status_code: record.i64_attribute(keys::STATUS_CODE),
        start_time_ms: record.start_time_ms,
        end_time_ms: record.end_time_ms,
        duration_ms: duration_ms(record, VIEW)?,
        error_count: record.error_count(),
    };

    Ok(vec![ViewPayload::ApiCall(view)])
}
