//! Span event view: one record per event recorded on a span

use super::{required, str_attr};
use crate::domain::views::error::MalformedInputError;
use crate::domain::views::record::{EnrichedRecord, keys};
use crate::domain::views::view::{SpanEventView, ViewPayload, ViewType};

const VIEW: ViewType = ViewType::SpanEvent;

pub(super) fn generate(record: &EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError> {
    if record.events.is_empty() {
        return Ok(vec![]);
    }

    let trace_id = required(record.trace_id.as_ref(), VIEW, "trace_id")?;
    let span_id = required(record.span_id.as_ref(), VIEW, "span_id")?;
    let service_id = str_attr(record, keys::SERVICE_ID);
    let service_name = str_attr(record, keys::SERVICE_NAME);

    record
        .events
        .iter()
        .enumerate()
        .map(|(index, event)| -> Result<ViewPayload, MalformedInputError> {
            let event_name = required(event.name.as_ref(), VIEW, "events.name")?;
            Ok(ViewPayload::SpanEvent(SpanEventView {
                tenant_id: record.tenant_id.clone(),
                trace_id: trace_id.clone(),
                span_id: span_id.clone(),
                service_id: service_id.clone(),
                service_name: service_name.clone(),
                event_index: index as u32,
                event_name,
                event_time_ms: event.time_ms,
                attributes: event.attributes.clone(),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::views::generators::fixtures::{api_entry_span, event};
    use crate::domain::views::record::SpanEvent;

    #[test]
    fn test_no_events_not_applicable() {
        assert!(generate(&api_entry_span()).unwrap().is_empty());
    }

    #[test]
    fn test_one_view_per_event_in_order() {
        let mut record = api_entry_span();
        record.events = vec![event("retry", 5), event("exception", 9)];

        let payloads = generate(&record).unwrap();
        let names: Vec<_> = payloads
            .iter()
            .map(|p| match p {
                ViewPayload::SpanEvent(v) => (v.event_index, v.event_name.as_str()),
                _ => panic!("unexpected payload"),
            })
            .collect();
        assert_eq!(names, vec![(0, "retry"), (1, "exception")]);
    }

    #[test]
    fn test_unnamed_event_is_malformed() {
        let mut record = api_entry_span();
        record.events = vec![event("ok", 1), SpanEvent::default()];
        assert_eq!(generate(&record).unwrap_err().field, "events.name");
    }

    #[test]
    fn test_operation_name_not_required() {
        let mut record = api_entry_span();
        record.operation_name = None;
        record.events = vec![event("log", 1)];
        assert_eq!(generate(&record).unwrap().len(), 1);
    }
}
