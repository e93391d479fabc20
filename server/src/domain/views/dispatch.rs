//! Generator dispatch table
//!
//! Generators are registered as tagged function values and resolved once
//! into an immutable table. The table is validated against the schema
//! registry at build time: every registered view has exactly one generator
//! and every generator has a schema.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::{ConfigurationError, MalformedInputError};
use super::generators::{self, GenerateFn};
use super::record::EnrichedRecord;
use super::registry::SchemaRegistry;
use super::view::{GenerationResult, ViewRecord, ViewType};

/// Per-view results of running every generator against one record
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    key: String,
    results: BTreeMap<ViewType, GenerationResult>,
}

impl DispatchOutcome {
    /// Source record key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, view_type: ViewType) -> Option<&GenerationResult> {
        self.results.get(&view_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewType, &GenerationResult)> {
        self.results.iter().map(|(v, r)| (*v, r))
    }

    /// Generator failures collected after all generators ran
    pub fn failures(&self) -> Vec<&MalformedInputError> {
        self.results
            .values()
            .filter_map(|r| match r {
                GenerationResult::Failed(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Total records produced across views
    pub fn record_count(&self) -> usize {
        self.results.values().map(|r| r.records().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Immutable view type → generator table
pub struct DispatchTable {
    registry: Arc<SchemaRegistry>,
    generators: BTreeMap<ViewType, GenerateFn>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    /// Table with the built-in generator of every view in the registry
    pub fn with_builtins(registry: Arc<SchemaRegistry>) -> Result<Self, ConfigurationError> {
        let views: Vec<ViewType> = registry.view_types().collect();
        views
            .into_iter()
            .fold(Self::builder(), |b, v| b.register(v, generators::builtin(v)))
            .build(registry)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn view_types(&self) -> impl Iterator<Item = ViewType> + '_ {
        self.generators.keys().copied()
    }

    /// Run every generator against the record.
    ///
    /// A failing generator never prevents the others from running; its
    /// error is kept in the outcome under its view type.
    pub fn dispatch(&self, record: &EnrichedRecord) -> DispatchOutcome {
        let results = self
            .generators
            .iter()
            .map(|(&view_type, generate)| (view_type, self.run_one(view_type, *generate, record)))
            .collect();

        DispatchOutcome {
            key: record.key.clone(),
            results,
        }
    }

    fn run_one(
        &self,
        view_type: ViewType,
        generate: GenerateFn,
        record: &EnrichedRecord,
    ) -> GenerationResult {
        // Validated at build time
        let schema_version = self.registry.get(view_type).map_or(0, |s| s.version);

        let payloads = match generate(record) {
            Ok(payloads) => payloads,
            Err(e) => return GenerationResult::Failed(e),
        };

        let records: Vec<ViewRecord> = payloads
            .into_iter()
            .filter(|p| {
                let matches = p.view_type() == view_type;
                if !matches {
                    tracing::warn!(
                        view = %view_type,
                        payload = %p.view_type(),
                        "Generator emitted payload of another view type, dropping"
                    );
                }
                matches
            })
            .map(|payload| ViewRecord {
                key: record.key.clone(),
                schema_version,
                payload,
            })
            .collect();

        if records.is_empty() {
            GenerationResult::NotApplicable
        } else {
            GenerationResult::Produced(records)
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("views", &self.generators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects generator registrations, validated in `build()`
#[derive(Default)]
pub struct DispatchTableBuilder {
    registrations: Vec<(ViewType, GenerateFn)>,
}

impl DispatchTableBuilder {
    pub fn register(mut self, view_type: ViewType, generate: GenerateFn) -> Self {
        self.registrations.push((view_type, generate));
        self
    }

    pub fn build(self, registry: Arc<SchemaRegistry>) -> Result<DispatchTable, ConfigurationError> {
        let mut generators = BTreeMap::new();
        for (view_type, generate) in self.registrations {
            if generators.insert(view_type, generate).is_some() {
                return Err(ConfigurationError::DuplicateGenerator(view_type));
            }
            if !registry.contains(view_type) {
                return Err(ConfigurationError::MissingSchema(view_type));
            }
        }

        if let Some(missing) = registry.view_types().find(|v| !generators.contains_key(v)) {
            return Err(ConfigurationError::MissingGenerator(missing));
        }

        Ok(DispatchTable {
            registry,
            generators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::views::generators::fixtures::{api_entry_span, event};
    use crate::domain::views::view::ViewPayload;

    fn default_table() -> DispatchTable {
        DispatchTable::with_builtins(Arc::new(SchemaRegistry::with_defaults().unwrap())).unwrap()
    }

    #[test]
    fn test_api_call_scenario() {
        let outcome = default_table().dispatch(&api_entry_span());

        let api = outcome.get(ViewType::ApiCall).unwrap();
        assert_eq!(api.records().len(), 1);
        assert_eq!(
            outcome.get(ViewType::SpanEvent),
            Some(&GenerationResult::NotApplicable)
        );
        assert_eq!(
            outcome.get(ViewType::BackendCall),
            Some(&GenerationResult::NotApplicable)
        );
        assert!(outcome.failures().is_empty());
    }

    #[test]
    fn test_isolation_on_missing_operation_name() {
        let mut record = api_entry_span();
        record.operation_name = None;
        record.events = vec![event("exception", 3)];

        let outcome = default_table().dispatch(&record);

        assert!(matches!(
            outcome.get(ViewType::ApiCall),
            Some(GenerationResult::Failed(e)) if e.field == "operation_name"
        ));
        assert_eq!(outcome.get(ViewType::ServiceCall).unwrap().records().len(), 1);
        assert_eq!(outcome.get(ViewType::SpanEvent).unwrap().records().len(), 1);
        assert_eq!(outcome.failures().len(), 1);
    }

    #[test]
    fn test_keys_and_versions_follow_source_and_registry() {
        let mut record = api_entry_span();
        record.events = vec![event("a", 1), event("b", 2)];
        let table = default_table();
        let outcome = table.dispatch(&record);

        for (view_type, result) in outcome.iter() {
            let version = table.registry().get(view_type).unwrap().version;
            for view in result.records() {
                assert_eq!(view.key, record.key);
                assert_eq!(view.schema_version, version);
                assert_eq!(view.view_type(), view_type);
            }
        }
        assert_eq!(outcome.record_count(), 4);
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let mut record = api_entry_span();
        record.events = vec![event("a", 1)];
        let table = default_table();
        let first = table.dispatch(&record);
        for _ in 0..10 {
            assert_eq!(table.dispatch(&record), first);
        }
    }

    #[test]
    fn test_duplicate_generator_rejected() {
        let registry = Arc::new(SchemaRegistry::with_defaults().unwrap());
        let err = DispatchTable::builder()
            .register(ViewType::ApiCall, generators::builtin(ViewType::ApiCall))
            .register(ViewType::ApiCall, generators::builtin(ViewType::ApiCall))
            .build(registry)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateGenerator(ViewType::ApiCall));
    }

    #[test]
    fn test_missing_generator_rejected() {
        let registry = Arc::new(SchemaRegistry::with_defaults().unwrap());
        let err = DispatchTable::builder()
            .register(ViewType::ApiCall, generators::builtin(ViewType::ApiCall))
            .build(registry)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingGenerator(ViewType::BackendCall));
    }

    #[test]
    fn test_generator_without_schema_rejected() {
        let registry = Arc::new(
            SchemaRegistry::builder()
                .bind(ViewType::ApiCall, "api")
                .build()
                .unwrap(),
        );
        let err = DispatchTable::builder()
            .register(ViewType::ApiCall, generators::builtin(ViewType::ApiCall))
            .register(ViewType::SpanEvent, generators::builtin(ViewType::SpanEvent))
            .build(registry)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingSchema(ViewType::SpanEvent));
    }

    #[test]
    fn test_subset_of_views() {
        let registry = Arc::new(
            SchemaRegistry::builder()
                .bind(ViewType::SpanEvent, "events")
                .build()
                .unwrap(),
        );
        let table = DispatchTable::with_builtins(registry).unwrap();
        let outcome = table.dispatch(&api_entry_span());
        assert_eq!(outcome.len(), 1);
        assert_eq!(
            outcome.get(ViewType::SpanEvent),
            Some(&GenerationResult::NotApplicable)
        );
    }

    #[test]
    fn test_foreign_payload_dropped() {
        fn confused(record: &EnrichedRecord) -> Result<Vec<ViewPayload>, MalformedInputError> {
            generators::builtin(ViewType::ApiCall)(record)
        }
        let registry = Arc::new(
            SchemaRegistry::builder()
                .bind(ViewType::BackendCall, "backend")
                .build()
                .unwrap(),
        );
        let table = DispatchTable::builder()
            .register(ViewType::BackendCall, confused)
            .build(registry)
            .unwrap();
        let outcome = table.dispatch(&api_entry_span());
        assert_eq!(
            outcome.get(ViewType::BackendCall),
            Some(&GenerationResult::NotApplicable)
        );
    }
}
