//! View schema registry
//!
//! Static catalog of view schemas plus the output channel bound to each
//! enabled view type. Built once at startup and shared read-only across all
//! drivers (`Arc<SchemaRegistry>`); there is no mutation API.

use std::collections::BTreeMap;

use super::error::ConfigurationError;
use super::view::ViewType;

/// Output schema of one view type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSchema {
    pub view_type: ViewType,
    /// Schema name as known by downstream consumers
    pub name: &'static str,
    /// Registry-assigned version tag carried by every emitted record
    pub version: u32,
    /// Payload fields, in serialization order
    pub fields: &'static [&'static str],
    /// Output channel identifier
    pub channel: String,
}

/// Catalog entry: schema identity without a channel binding
struct CatalogEntry {
    name: &'static str,
    version: u32,
    default_channel: &'static str,
    fields: &'static [&'static str],
}

fn catalog_entry(view_type: ViewType) -> CatalogEntry {
    match view_type {
        ViewType::ApiCall => CatalogEntry {
            name: "ApiCallView",
            version: 1,
            default_channel: "api-call-view-events",
            fields: &[
                "tenant_id",
                "trace_id",
                "span_id",
                "parent_span_id",
                "service_id",
                "service_name",
                "api_id",
                "api_name",
                "api_discovery_state",
                "operation_name",
                "protocol",
                "status_code",
                "start_time_ms",
                "end_time_ms",
                "duration_ms",
                "error_count",
            ],
        },
        ViewType::BackendCall => CatalogEntry {
            name: "BackendCallView",
            version: 1,
            default_channel: "backend-call-view-events",
            fields: &[
                "tenant_id",
                "trace_id",
                "span_id",
                "parent_span_id",
                "backend_id",
                "backend_name",
                "backend_protocol",
                "backend_host",
                "backend_path",
                "caller_service_id",
                "caller_service_name",
                "operation_name",
                "status_code",
                "start_time_ms",
                "end_time_ms",
                "duration_ms",
                "error_count",
            ],
        },
        ViewType::ServiceCall => CatalogEntry {
            name: "ServiceCallView",
            version: 1,
            default_channel: "service-call-view-events",
            fields: &[
                "tenant_id",
                "trace_id",
                "span_id",
                "side",
                "caller_service_id",
                "caller_service_name",
                "callee_service_id",
                "callee_service_name",
                "callee_backend_id",
                "callee_backend_name",
                "start_time_ms",
                "end_time_ms",
                "duration_ms",
                "error_count",
            ],
        },
        ViewType::SpanEvent => CatalogEntry {
            name: "SpanEventView",
            version: 2,
            default_channel: "span-event-view-events",
            fields: &[
                "tenant_id",
                "trace_id",
                "span_id",
                "service_id",
                "service_name",
                "event_index",
                "event_name",
                "event_time_ms",
                "attributes",
            ],
        },
    }
}

/// Default output channel for a view type
pub fn default_channel(view_type: ViewType) -> &'static str {
    catalog_entry(view_type).default_channel
}

/// Immutable view type → schema/channel mapping
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<ViewType, ViewSchema>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Registry with every view type bound to its default channel
    pub fn with_defaults() -> Result<Self, ConfigurationError> {
        ViewType::ALL
            .into_iter()
            .fold(Self::builder(), |b, v| b.bind(v, default_channel(v)))
            .build()
    }

    pub fn get(&self, view_type: ViewType) -> Option<&ViewSchema> {
        self.schemas.get(&view_type)
    }

    pub fn channel(&self, view_type: ViewType) -> Option<&str> {
        self.schemas.get(&view_type).map(|s| s.channel.as_str())
    }

    pub fn contains(&self, view_type: ViewType) -> bool {
        self.schemas.contains_key(&view_type)
    }

    pub fn view_types(&self) -> impl Iterator<Item = ViewType> + '_ {
        self.schemas.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Collects channel bindings, validated in `build()`
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    bindings: Vec<(ViewType, String)>,
}

impl SchemaRegistryBuilder {
    /// Bind a view type to an output channel; later bindings win
    pub fn bind(mut self, view_type: ViewType, channel: impl Into<String>) -> Self {
        self.bindings.retain(|(v, _)| *v != view_type);
        self.bindings.push((view_type, channel.into()));
        self
    }

    pub fn build(self) -> Result<SchemaRegistry, ConfigurationError> {
        if self.bindings.is_empty() {
            return Err(ConfigurationError::NoViewsEnabled);
        }

        let mut schemas = BTreeMap::new();
        let mut channel_owners: BTreeMap<String, ViewType> = BTreeMap::new();

        for (view_type, channel) in self.bindings {
            let channel = channel.trim().to_string();
            if channel.is_empty() {
                return Err(ConfigurationError::UnresolvedChannel(view_type));
            }
            if let Some(&first) = channel_owners.get(&channel) {
                return Err(ConfigurationError::DuplicateChannel {
                    first,
                    second: view_type,
                    channel,
                });
            }
            channel_owners.insert(channel.clone(), view_type);

            let entry = catalog_entry(view_type);
            schemas.insert(
                view_type,
                ViewSchema {
                    view_type,
                    name: entry.name,
                    version: entry.version,
                    fields: entry.fields,
                    channel,
                },
            );
        }

        Ok(SchemaRegistry { schemas })
    }
}
