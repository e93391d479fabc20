use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_CONSUMER_GROUP, ENV_FETCH_TIMEOUT_MS, ENV_INPUT_PATH, ENV_INPUT_TOPIC,
    ENV_MAX_PUBLISH_ATTEMPTS, ENV_OUTPUT_DIR, ENV_PARTITIONS, ENV_PUBLISH_TIMEOUT_MS,
    ENV_RETRY_BASE_DELAY_MS, ENV_VIEWS,
};
use crate::domain::views::ViewType;

#[derive(Parser)]
#[command(name = "viewgen")]
#[command(version, about = "Streaming view generator for enriched spans", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Input topic name
    #[arg(long, global = true, env = ENV_INPUT_TOPIC)]
    pub input_topic: Option<String>,

    /// Consumer group of the partition drivers
    #[arg(long, global = true, env = ENV_CONSUMER_GROUP)]
    pub consumer_group: Option<String>,

    /// Number of input partitions (one driver each)
    #[arg(long, global = true, env = ENV_PARTITIONS)]
    pub partitions: Option<u32>,

    /// Fetch timeout in milliseconds
    #[arg(long, global = true, env = ENV_FETCH_TIMEOUT_MS)]
    pub fetch_timeout_ms: Option<u64>,

    /// Publish acknowledgement timeout in milliseconds
    #[arg(long, global = true, env = ENV_PUBLISH_TIMEOUT_MS)]
    pub publish_timeout_ms: Option<u64>,

    /// Publish attempts per view record, including the first
    #[arg(long, global = true, env = ENV_MAX_PUBLISH_ATTEMPTS)]
    pub max_publish_attempts: Option<u32>,

    /// Base delay of the exponential publish backoff in milliseconds
    #[arg(long, global = true, env = ENV_RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: Option<u64>,

    /// Enabled view types, comma separated (api_call, backend_call, service_call, span_event)
    #[arg(long, global = true, env = ENV_VIEWS, value_delimiter = ',')]
    pub views: Option<Vec<ViewType>>,

    /// Bind a view type to an output channel (VIEW=CHANNEL), repeatable
    #[arg(long = "channel", global = true, value_parser = parse_channel_binding)]
    pub channels: Vec<(ViewType, String)>,

    /// JSON lines file replayed into the input topic
    #[arg(long, short = 'i', global = true, env = ENV_INPUT_PATH)]
    pub input: Option<PathBuf>,

    /// Write view records as JSON lines under this directory
    #[arg(long, short = 'o', global = true, env = ENV_OUTPUT_DIR)]
    pub output_dir: Option<PathBuf>,
}

/// Parse a VIEW=CHANNEL binding from CLI string
fn parse_channel_binding(s: &str) -> Result<(ViewType, String), String> {
    let (view, channel) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid channel binding '{}'. Expected VIEW=CHANNEL", s))?;
    let view: ViewType = view.trim().parse()?;
    let channel = channel.trim();
    if channel.is_empty() {
        return Err(format!("Channel for view '{}' must not be empty", view));
    }
    Ok((view, channel.to_string()))
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run the pipeline (default command)
    Start,
    /// Print the resolved view catalog
    Views,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub input_topic: Option<String>,
    pub consumer_group: Option<String>,
    pub partitions: Option<u32>,
    pub fetch_timeout_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
    pub max_publish_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub views: Option<Vec<ViewType>>,
    pub channels: Vec<(ViewType, String)>,
    pub input: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        input_topic: cli.input_topic,
        consumer_group: cli.consumer_group,
        partitions: cli.partitions,
        fetch_timeout_ms: cli.fetch_timeout_ms,
        publish_timeout_ms: cli.publish_timeout_ms,
        max_publish_attempts: cli.max_publish_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        views: cli.views,
        channels: cli.channels,
        input: cli.input,
        output_dir: cli.output_dir,
    };
    (config, cli.command)
}
