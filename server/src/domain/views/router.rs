//! Record router
//!
//! Publishes the records of a dispatch outcome to the output channel the
//! schema registry binds to each view type. Publication is best effort per
//! view: a channel that stays down only fails its own view, and the report
//! tells the driver exactly what happened to each view of the record.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::dispatch::DispatchOutcome;
use super::error::{MalformedInputError, PublishError};
use super::registry::SchemaRegistry;
use super::view::{GenerationResult, ViewRecord, ViewType};
use crate::core::constants::DEFAULT_PUBLISH_TIMEOUT_MS;
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff_async};

// ============================================================================
// OUTPUT BOUNDARY
// ============================================================================

/// Output channel boundary: one logical channel per view type
#[async_trait]
pub trait ViewSink: Send + Sync {
    /// Publish one record keyed by `record.key`; resolves once acknowledged
    async fn publish(&self, channel: &str, record: &ViewRecord) -> Result<(), PublishError>;

    /// Sink name for logging
    fn name(&self) -> &'static str;
}

/// Retry and timeout settings for publication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Attempts per record, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Bound on each publish acknowledgement
    pub publish_timeout: Duration,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
        }
    }
}

// ============================================================================
// ROUTE REPORT
// ============================================================================

/// What happened to one view of a record
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRouteOutcome {
    /// Every record was acknowledged
    Published { records: usize, retries: u32 },
    /// At least one record exhausted its attempts or failed permanently
    PublishFailed {
        published: usize,
        failed: usize,
        retries: u32,
        error: PublishError,
    },
    /// The generator rejected the record; nothing was published
    Malformed(MalformedInputError),
    /// The view does not apply to the record
    NotApplicable,
}

/// Per-view routing results for one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteReport {
    outcomes: BTreeMap<ViewType, ViewRouteOutcome>,
}

impl RouteReport {
    pub fn outcome(&self, view_type: ViewType) -> Option<&ViewRouteOutcome> {
        self.outcomes.get(&view_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewType, &ViewRouteOutcome)> {
        self.outcomes.iter().map(|(v, o)| (*v, o))
    }

    fn views_where(&self, pred: impl Fn(&ViewRouteOutcome) -> bool) -> Vec<ViewType> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(o))
            .map(|(v, _)| *v)
            .collect()
    }

    pub fn succeeded(&self) -> Vec<ViewType> {
        self.views_where(|o| matches!(o, ViewRouteOutcome::Published { .. }))
    }

    pub fn failed(&self) -> Vec<ViewType> {
        self.views_where(|o| matches!(o, ViewRouteOutcome::PublishFailed { .. }))
    }

    pub fn malformed(&self) -> Vec<ViewType> {
        self.views_where(|o| matches!(o, ViewRouteOutcome::Malformed(_)))
    }

    pub fn skipped(&self) -> Vec<ViewType> {
        self.views_where(|o| matches!(o, ViewRouteOutcome::NotApplicable))
    }

    /// Retries spent across all views
    pub fn retries(&self) -> u32 {
        self.outcomes
            .values()
            .map(|o| match o {
                ViewRouteOutcome::Published { retries, .. }
                | ViewRouteOutcome::PublishFailed { retries, .. } => *retries,
                _ => 0,
            })
            .sum()
    }

    /// Records acknowledged across all views
    pub fn published(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                ViewRouteOutcome::Published { records, .. } => *records,
                ViewRouteOutcome::PublishFailed { published, .. } => *published,
                _ => 0,
            })
            .sum()
    }

    /// Records that could not be published across all views
    pub fn unpublished(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                ViewRouteOutcome::PublishFailed { failed, .. } => *failed,
                _ => 0,
            })
            .sum()
    }

    /// Only "succeeded" and "not applicable" outcomes
    pub fn is_clean(&self) -> bool {
        self.outcomes.values().all(|o| {
            matches!(
                o,
                ViewRouteOutcome::Published { .. } | ViewRouteOutcome::NotApplicable
            )
        })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Publishes generated view records to their registry channels
pub struct RecordRouter {
    registry: Arc<SchemaRegistry>,
    sink: Arc<dyn ViewSink>,
    policy: RoutePolicy,
}

impl RecordRouter {
    pub fn new(registry: Arc<SchemaRegistry>, sink: Arc<dyn ViewSink>, policy: RoutePolicy) -> Self {
        Self {
            registry,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> RoutePolicy {
        self.policy
    }

    /// Route every view of a dispatch outcome
    pub async fn route(&self, outcome: &DispatchOutcome) -> RouteReport {
        let mut outcomes = BTreeMap::new();

        for (view_type, result) in outcome.iter() {
            let view_outcome = match result {
                GenerationResult::NotApplicable => ViewRouteOutcome::NotApplicable,
                GenerationResult::Failed(e) => ViewRouteOutcome::Malformed(e.clone()),
                GenerationResult::Produced(records) => {
                    self.publish_view(view_type, records).await
                }
            };
            outcomes.insert(view_type, view_outcome);
        }

        RouteReport { outcomes }
    }

    async fn publish_view(&self, view_type: ViewType, records: &[ViewRecord]) -> ViewRouteOutcome {
        let Some(channel) = self.registry.channel(view_type) else {
            return ViewRouteOutcome::PublishFailed {
                published: 0,
                failed: records.len(),
                retries: 0,
                error: PublishError::Unbound(view_type),
            };
        };

        let mut published = 0usize;
        let mut retries = 0u32;
        let mut last_error = None;

        for record in records {
            match self.publish_one(channel, record).await {
                Ok(attempts) => {
                    published += 1;
                    retries += attempts - 1;
                }
                Err((e, attempts)) => {
                    retries += attempts - 1;
                    tracing::warn!(
                        error = %e,
                        view = %view_type,
                        channel,
                        key = %record.key,
                        attempts,
                        "Giving up publishing view record"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => ViewRouteOutcome::Published {
                records: published,
                retries,
            },
            Some(error) => ViewRouteOutcome::PublishFailed {
                published,
                failed: records.len() - published,
                retries,
                error,
            },
        }
    }

    async fn publish_one(
        &self,
        channel: &str,
        record: &ViewRecord,
    ) -> Result<u32, (PublishError, u32)> {
        let sink = &self.sink;
        let timeout = self.policy.publish_timeout;

        retry_with_backoff_async(
            self.policy.max_attempts,
            self.policy.base_delay_ms,
            PublishError::is_retryable,
            move || async move {
                match tokio::time::timeout(timeout, sink.publish(channel, record)).await {
                    Ok(result) => result,
                    Err(_) => Err(PublishError::Timeout {
                        channel: channel.to_string(),
                        timeout,
                    }),
                }
            },
        )
        .await
    }
}
