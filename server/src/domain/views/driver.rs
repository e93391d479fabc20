//! Pipeline driver
//!
//! One driver per input partition. Each record goes through
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Dispatching ─▶ Routing ─▶ Committing ─▶ Idle
//!            │
//!            └─▶ Stopped (shutdown / input closed)   Failed (input unusable)
//! ```
//!
//! Records are processed strictly one at a time. Shutdown is only observed
//! while fetching, so a record that has been fetched is always dispatched,
//! routed and committed. Malformed records and records whose publishes
//! exhausted their retries are committed too: the driver never stalls on a
//! record it cannot fully process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::dispatch::DispatchTable;
use super::record::EnrichedRecord;
use super::router::{RecordRouter, RouteReport, ViewRouteOutcome};
use super::source::{Delivery, RecordSource};

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Fetching,
    Dispatching,
    Routing,
    Committing,
    Stopped,
    Failed,
}

impl DriverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Per-driver counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub records_fetched: u64,
    pub records_committed: u64,
    /// Payloads that could not be decoded into a record
    pub records_undecodable: u64,
    /// Records with at least one malformed view
    pub records_malformed: u64,
    pub views_published: u64,
    pub views_failed: u64,
    pub views_skipped: u64,
    pub views_malformed: u64,
    /// View records acknowledged by their channel
    pub view_records_published: u64,
    pub publish_retries: u64,
    pub fetch_errors: u64,
    pub commit_failures: u64,
}

impl DriverStats {
    /// Fold another driver's counters into this one
    pub fn merge(&mut self, other: &DriverStats) {
        self.records_fetched += other.records_fetched;
        self.records_committed += other.records_committed;
        self.records_undecodable += other.records_undecodable;
        self.records_malformed += other.records_malformed;
        self.views_published += other.views_published;
        self.views_failed += other.views_failed;
        self.views_skipped += other.views_skipped;
        self.views_malformed += other.views_malformed;
        self.view_records_published += other.view_records_published;
        self.publish_retries += other.publish_retries;
        self.fetch_errors += other.fetch_errors;
        self.commit_failures += other.commit_failures;
    }

    fn record_report(&mut self, report: &RouteReport) {
        for (_, outcome) in report.iter() {
            match outcome {
                ViewRouteOutcome::Published { .. } => self.views_published += 1,
                ViewRouteOutcome::PublishFailed { .. } => self.views_failed += 1,
                ViewRouteOutcome::Malformed(_) => self.views_malformed += 1,
                ViewRouteOutcome::NotApplicable => self.views_skipped += 1,
            }
        }
        if !report.malformed().is_empty() {
            self.records_malformed += 1;
        }
        self.view_records_published += report.published() as u64;
        self.publish_retries += u64::from(report.retries());
    }
}

/// Sequential fetch → dispatch → route → commit loop for one partition
pub struct PipelineDriver {
    table: Arc<DispatchTable>,
    router: Arc<RecordRouter>,
    fetch_timeout: Duration,
    state: DriverState,
    stats: DriverStats,
}

impl PipelineDriver {
    pub fn new(table: Arc<DispatchTable>, router: Arc<RecordRouter>, fetch_timeout: Duration) -> Self {
        Self {
            table,
            router,
            fetch_timeout,
            state: DriverState::Idle,
            stats: DriverStats::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Spawn the driver; the handle resolves to its final counters
    pub fn start<S>(
        mut self,
        mut source: S,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<DriverStats>
    where
        S: RecordSource + 'static,
    {
        tokio::spawn(async move {
            self.run(&mut source, shutdown_rx).await;
            self.stats
        })
    }

    /// Run until shutdown, input close or a fatal input error
    pub async fn run<S: RecordSource>(
        &mut self,
        source: &mut S,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> DriverState {
        let partition = source.partition();
        tracing::debug!(partition, "PipelineDriver started");

        while !self.state.is_terminal() {
            self.transition(partition, DriverState::Fetching);

            if *shutdown_rx.borrow() {
                self.transition(partition, DriverState::Stopped);
                break;
            }

            let fetched = tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!(partition, "PipelineDriver received shutdown");
                        self.transition(partition, DriverState::Stopped);
                    } else {
                        self.transition(partition, DriverState::Idle);
                    }
                    continue;
                }
                fetched = tokio::time::timeout(self.fetch_timeout, source.fetch()) => fetched,
            };

            match fetched {
                // Nothing arrived in time
                Err(_) => self.transition(partition, DriverState::Idle),
                Ok(Ok(None)) => {
                    tracing::debug!(partition, "Input closed");
                    self.transition(partition, DriverState::Stopped);
                }
                Ok(Ok(Some(delivery))) => {
                    self.stats.records_fetched += 1;
                    self.process(partition, source, delivery).await;
                    self.transition(partition, DriverState::Idle);
                }
                Ok(Err(e)) if e.is_fatal() => {
                    tracing::error!(error = %e, partition, "Input unusable, stopping driver");
                    self.stats.fetch_errors += 1;
                    self.transition(partition, DriverState::Failed);
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, partition, "Fetch failed");
                    self.stats.fetch_errors += 1;
                    self.transition(partition, DriverState::Idle);
                }
            }
        }

        tracing::debug!(
            partition,
            state = ?self.state,
            fetched = self.stats.records_fetched,
            committed = self.stats.records_committed,
            "PipelineDriver shutdown complete"
        );
        self.state
    }

    async fn process<S: RecordSource>(&mut self, partition: u32, source: &mut S, delivery: Delivery) {
        self.transition(partition, DriverState::Dispatching);

        match EnrichedRecord::from_json(&delivery.payload) {
            Ok(record) => {
                let outcome = self.table.dispatch(&record);
                for failure in outcome.failures() {
                    tracing::warn!(
                        key = %record.key,
                        view = %failure.view_type,
                        field = failure.field,
                        reason = %failure.reason,
                        "Malformed record for view"
                    );
                }

                self.transition(partition, DriverState::Routing);
                let report = self.router.route(&outcome).await;
                self.stats.record_report(&report);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %delivery.key,
                    cursor = %delivery.cursor,
                    "Undecodable record, committing to discard"
                );
                self.stats.records_undecodable += 1;
            }
        }

        self.transition(partition, DriverState::Committing);
        match source.commit(delivery.cursor).await {
            Ok(()) => self.stats.records_committed += 1,
            Err(e) => {
                tracing::warn!(error = %e, cursor = %delivery.cursor, "Failed to commit record");
                self.stats.commit_failures += 1;
            }
        }
    }

    fn transition(&mut self, partition: u32, next: DriverState) {
        tracing::trace!(partition, from = ?self.state, to = ?next, "Driver state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::data::topics::{StreamPosition, TopicError};
    use crate::domain::views::generators::fixtures::api_entry_span;
    use crate::domain::views::registry::SchemaRegistry;
    use crate::domain::views::router::RoutePolicy;
    use crate::domain::views::testing::RecordingSink;

    /// Scripted source; closes once the script runs out unless `hold_open`
    #[derive(Default)]
    struct ScriptedSource {
        script: VecDeque<Result<Delivery, TopicError>>,
        hold_open: bool,
        committed: Vec<StreamPosition>,
        fail_commits: bool,
    }

    impl ScriptedSource {
        fn push(&mut self, offset: u64, payload: &[u8]) {
            self.script.push_back(Ok(Delivery {
                cursor: StreamPosition {
                    partition: 0,
                    offset,
                },
                key: format!("key-{offset}"),
                payload: payload.to_vec(),
            }));
        }
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn fetch(&mut self) -> Result<Option<Delivery>, TopicError> {
            match self.script.pop_front() {
                Some(next) => next.map(Some),
                None if self.hold_open => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn commit(&mut self, cursor: StreamPosition) -> Result<(), TopicError> {
            if self.fail_commits {
                return Err(TopicError::Stream("ack lost".into()));
            }
            self.committed.push(cursor);
            Ok(())
        }

        fn partition(&self) -> u32 {
            0
        }
    }

    fn driver(sink: Arc<RecordingSink>) -> PipelineDriver {
        let registry = Arc::new(SchemaRegistry::with_defaults().unwrap());
        let table = Arc::new(DispatchTable::with_builtins(Arc::clone(&registry)).unwrap());
        let policy = RoutePolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            publish_timeout: Duration::from_millis(200),
        };
        let router = Arc::new(RecordRouter::new(registry, sink, policy));
        PipelineDriver::new(table, router, Duration::from_millis(20))
    }

    fn span_json() -> Vec<u8> {
        serde_json::to_vec(&api_entry_span()).unwrap()
    }

    #[tokio::test]
    async fn test_processes_until_input_closes() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource::default();
        source.push(0, &span_json());
        source.push(1, &span_json());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink.clone());
        let state = driver.run(&mut source, rx).await;

        assert_eq!(state, DriverState::Stopped);
        assert_eq!(source.committed.len(), 2);
        let stats = driver.stats();
        assert_eq!(stats.records_fetched, 2);
        assert_eq!(stats.records_committed, 2);
        assert_eq!(stats.views_published, 4);
        assert_eq!(stats.views_skipped, 4);
        assert_eq!(sink.published().len(), 4);
    }

    #[tokio::test]
    async fn test_undecodable_payload_committed() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource::default();
        source.push(0, b"{not json");
        source.push(1, &span_json());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink);
        driver.run(&mut source, rx).await;

        assert_eq!(source.committed.len(), 2);
        assert_eq!(driver.stats().records_undecodable, 1);
        assert_eq!(driver.stats().records_committed, 2);
    }

    #[tokio::test]
    async fn test_malformed_record_committed_and_counted() {
        let sink = Arc::new(RecordingSink::default());
        let mut record = api_entry_span();
        record.operation_name = None;
        let mut source = ScriptedSource::default();
        source.push(0, &serde_json::to_vec(&record).unwrap());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink.clone());
        driver.run(&mut source, rx).await;

        assert_eq!(source.committed.len(), 1);
        assert_eq!(driver.stats().records_malformed, 1);
        assert_eq!(driver.stats().views_malformed, 1);
        assert_eq!(sink.keys_on("service-call-view-events"), vec![record.key]);
    }

    #[tokio::test]
    async fn test_commit_failure_does_not_stop_loop() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource {
            fail_commits: true,
            ..Default::default()
        };
        source.push(0, &span_json());
        source.push(1, &span_json());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink);
        let state = driver.run(&mut source, rx).await;

        assert_eq!(state, DriverState::Stopped);
        assert_eq!(driver.stats().commit_failures, 2);
        assert_eq!(driver.stats().records_fetched, 2);
    }

    #[tokio::test]
    async fn test_fatal_fetch_error_fails_driver() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource::default();
        source
            .script
            .push_back(Err(TopicError::ConsumerGroup("gone".into())));
        source.push(0, &span_json());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink);
        let state = driver.run(&mut source, rx).await;

        assert_eq!(state, DriverState::Failed);
        assert_eq!(driver.stats().records_fetched, 0);
    }

    #[tokio::test]
    async fn test_transient_fetch_error_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource::default();
        source.script.push_back(Err(TopicError::Stream("hiccup".into())));
        source.push(0, &span_json());
        let (_tx, rx) = watch::channel(false);

        let mut driver = driver(sink);
        driver.run(&mut source, rx).await;

        assert_eq!(driver.stats().fetch_errors, 1);
        assert_eq!(driver.stats().records_committed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource {
            hold_open: true,
            ..Default::default()
        };
        source.push(0, &span_json());
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        });

        let mut driver = driver(sink);
        let state = tokio::time::timeout(Duration::from_secs(2), driver.run(&mut source, rx))
            .await
            .unwrap();

        assert_eq!(state, DriverState::Stopped);
        assert_eq!(source.committed.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_routing_finishes_record() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(100)));
        let mut source = ScriptedSource {
            hold_open: true,
            ..Default::default()
        };
        source.push(0, &span_json());
        let (tx, rx) = watch::channel(false);

        let observer = Arc::clone(&sink);
        let signal = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let published_at_signal = observer.published().len();
            tx.send(true).unwrap();
            published_at_signal
        });

        let mut driver = driver(Arc::clone(&sink));
        let state = tokio::time::timeout(Duration::from_secs(2), driver.run(&mut source, rx))
            .await
            .unwrap();

        // The signal landed while the first view was still publishing
        assert_eq!(signal.await.unwrap(), 0);
        assert_eq!(state, DriverState::Stopped);
        assert_eq!(source.committed.len(), 1);
        assert_eq!(driver.stats().records_committed, 1);
        assert_eq!(driver.stats().views_published, 2);
        let key = api_entry_span().key;
        assert_eq!(sink.keys_on("api-call-view-events"), vec![key.clone()]);
        assert_eq!(sink.keys_on("service-call-view-events"), vec![key]);
    }

    #[tokio::test]
    async fn test_already_shut_down_fetches_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = ScriptedSource::default();
        source.push(0, &span_json());
        let (_tx, rx) = watch::channel(true);

        let mut driver = driver(sink);
        let state = driver.run(&mut source, rx).await;

        assert_eq!(state, DriverState::Stopped);
        assert!(source.committed.is_empty());
    }

    #[test]
    fn test_stats_merge() {
        let mut total = DriverStats {
            records_fetched: 1,
            ..Default::default()
        };
        total.merge(&DriverStats {
            records_fetched: 2,
            publish_retries: 3,
            ..Default::default()
        });
        assert_eq!(total.records_fetched, 3);
        assert_eq!(total.publish_retries, 3);
    }
}
