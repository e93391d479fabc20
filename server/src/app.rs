//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{DEFAULT_LOG_FILTER, ENV_LOG, INPUT_DRAIN_POLL_MS};
use crate::core::shutdown::ShutdownService;
use crate::data::input::replay_json_lines;
use crate::data::topics::{StreamTopic, TopicError, TopicService};
use crate::domain::views::{
    DispatchTable, DriverStats, EnrichedRecord, FileSink, PipelineDriver, RecordRouter,
    TopicSink, TopicSource, ViewSink,
};

pub struct CoreApp {
    pub config: AppConfig,
    pub topics: Arc<TopicService>,
    pub table: Arc<DispatchTable>,
    pub router: Arc<RecordRouter>,
    pub sink_name: &'static str,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Views) => Self::print_views(&cli_config),
            Some(Commands::Start) | None => {
                let app = Self::init(&cli_config).await?;
                app.start_pipeline().await
            }
        }
    }

    fn print_views(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        banner::print_views(&config.schema_registry()?);
        Ok(())
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let registry = Arc::new(config.schema_registry()?);
        let table = Arc::new(DispatchTable::with_builtins(Arc::clone(&registry))?);

        let topics = Arc::new(TopicService::new(config.pipeline.partitions));
        topics
            .health_check()
            .await
            .context("Topic backend health check failed")?;
        tracing::debug!(
            backend = topics.backend_name(),
            partitions = topics.partitions(),
            "Topics initialized"
        );

        let sink: Arc<dyn ViewSink> = match &config.output_dir {
            Some(dir) => Arc::new(FileSink::new(dir.clone()).await.with_context(|| {
                format!("Failed to create output directory: {}", dir.display())
            })?),
            None => Arc::new(TopicSink::new(Arc::clone(&topics))),
        };
        let sink_name = sink.name();
        tracing::debug!(sink = sink_name, "Output sink initialized");

        let router = Arc::new(RecordRouter::new(registry, sink, config.route_policy()));
        let shutdown = ShutdownService::new(Arc::clone(&topics));

        Ok(Self {
            config,
            topics,
            table,
            router,
            sink_name,
            shutdown,
        })
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_pipeline(self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        let input = self
            .topics
            .stream_topic::<EnrichedRecord>(&self.config.pipeline.input_topic);
        self.start_drivers(&input).await?;

        banner::print_banner(&self.config, self.topics.backend_name(), self.sink_name);

        let outcome = match &self.config.input_path {
            Some(path) => self.replay_and_drain(path, &input).await,
            None => {
                self.shutdown.wait().await;
                Ok(())
            }
        };

        let stats = self.shutdown.shutdown().await;
        log_summary(&stats);
        outcome
    }

    /// Spawn one driver per input partition
    async fn start_drivers(&self, input: &StreamTopic<EnrichedRecord>) -> Result<()> {
        let pipeline = &self.config.pipeline;
        for partition in 0..pipeline.partitions {
            let subscriber = input
                .subscribe(&pipeline.consumer_group, partition)
                .await
                .with_context(|| format!("Failed to subscribe to partition {}", partition))?;
            let driver = PipelineDriver::new(
                Arc::clone(&self.table),
                Arc::clone(&self.router),
                pipeline.fetch_timeout,
            );
            self.shutdown
                .register(driver.start(TopicSource::new(subscriber), self.shutdown.subscribe()))
                .await;
        }
        tracing::debug!(count = pipeline.partitions, "Partition drivers started");
        Ok(())
    }

    /// Replay the input file, then wait until every line is committed or shutdown is requested
    async fn replay_and_drain(
        &self,
        path: &std::path::Path,
        input: &StreamTopic<EnrichedRecord>,
    ) -> Result<()> {
        let summary = replay_json_lines(path, input)
            .await
            .with_context(|| format!("Failed to replay input: {}", path.display()))?;
        tracing::info!(
            published = summary.published,
            unkeyed = summary.unkeyed,
            "Input replayed, waiting for drivers to drain"
        );

        tokio::select! {
            result = wait_for_drain(
                &self.topics,
                &self.shutdown,
                &self.config.pipeline.input_topic,
                &self.config.pipeline.consumer_group,
                summary.published,
            ) => {
                match result.context("Failed to read input topic stats")? {
                    Drain::Complete => tracing::debug!("Input drained"),
                    Drain::DriversStopped { acked } => tracing::warn!(
                        acked,
                        published = summary.published,
                        "Every partition driver stopped before the input drained"
                    ),
                }
            }
            _ = self.shutdown.wait() => {
                tracing::debug!("Shutdown requested before input drained");
            }
        }
        Ok(())
    }
}

/// How waiting for a replayed input ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    /// Every published line was acknowledged
    Complete,
    /// No driver is left to acknowledge the rest
    DriversStopped { acked: u64 },
}

/// Poll the consumer group until `expected` messages are acknowledged or every driver has stopped
async fn wait_for_drain(
    topics: &TopicService,
    shutdown: &ShutdownService,
    topic: &str,
    group: &str,
    expected: u64,
) -> Result<Drain, TopicError> {
    let mut interval = tokio::time::interval(Duration::from_millis(INPUT_DRAIN_POLL_MS));
    loop {
        interval.tick().await;
        // Checked before the stats so a driver's final commit is observed
        let stopped = shutdown.drivers_finished().await;
        let stats = topics.stream_stats(topic, group).await?;
        tracing::trace!(acked = stats.acked, pending = stats.pending, expected, "Drain progress");
        if stats.acked >= expected {
            return Ok(Drain::Complete);
        }
        if stopped {
            return Ok(Drain::DriversStopped { acked: stats.acked });
        }
    }
}

fn log_summary(stats: &DriverStats) {
    tracing::info!(
        records = stats.records_committed,
        undecodable = stats.records_undecodable,
        malformed = stats.records_malformed,
        views_published = stats.views_published,
        views_failed = stats.views_failed,
        view_records = stats.view_records_published,
        retries = stats.publish_retries,
        "Pipeline stopped"
    );
    if stats.views_failed > 0 || stats.commit_failures > 0 || stats.fetch_errors > 0 {
        tracing::warn!(
            views_failed = stats.views_failed,
            commit_failures = stats.commit_failures,
            fetch_errors = stats.fetch_errors,
            "Pipeline finished with errors"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_completes_when_all_acked() {
        let topics = Arc::new(TopicService::new(1));
        let shutdown = ShutdownService::new(Arc::clone(&topics));
        let topic = topics.stream_topic::<serde_json::Value>("input");
        let mut subscriber = topic.subscribe("g", 0).await.unwrap();
        topic.publish_raw("k", b"{}").await.unwrap();
        let (position, _) = subscriber.recv().await.unwrap();
        subscriber.acker().ack(position).await.unwrap();

        let drain = wait_for_drain(&topics, &shutdown, "input", "g", 1).await.unwrap();
        assert_eq!(drain, Drain::Complete);
    }

    #[tokio::test]
    async fn test_drain_ends_when_drivers_stop() {
        let topics = Arc::new(TopicService::new(1));
        let shutdown = ShutdownService::new(Arc::clone(&topics));
        let topic = topics.stream_topic::<serde_json::Value>("input");
        topic.publish_raw("k", b"{}").await.unwrap();
        let handle = tokio::spawn(async { DriverStats::default() });
        shutdown.register(handle).await;

        let drain = tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_drain(&topics, &shutdown, "input", "g", 1),
        )
        .await
        .expect("drain must not wait for a stopped pipeline")
        .unwrap();
        assert_eq!(drain, Drain::DriversStopped { acked: 0 });
    }
}
