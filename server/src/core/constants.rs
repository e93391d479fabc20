// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "ViewGen";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".viewgen";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "viewgen.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "VIEWGEN_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "VIEWGEN_LOG";

/// Log filter when neither `VIEWGEN_LOG` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "info";

// =============================================================================
// Environment Variables - Pipeline
// =============================================================================

pub const ENV_INPUT_TOPIC: &str = "VIEWGEN_INPUT_TOPIC";
pub const ENV_CONSUMER_GROUP: &str = "VIEWGEN_CONSUMER_GROUP";
pub const ENV_PARTITIONS: &str = "VIEWGEN_PARTITIONS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "VIEWGEN_FETCH_TIMEOUT_MS";
pub const ENV_PUBLISH_TIMEOUT_MS: &str = "VIEWGEN_PUBLISH_TIMEOUT_MS";
pub const ENV_MAX_PUBLISH_ATTEMPTS: &str = "VIEWGEN_MAX_PUBLISH_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "VIEWGEN_RETRY_BASE_DELAY_MS";

// =============================================================================
// Environment Variables - Views, Input and Output
// =============================================================================

/// Comma-separated list of enabled view types
pub const ENV_VIEWS: &str = "VIEWGEN_VIEWS";

/// JSON lines file replayed into the input topic
pub const ENV_INPUT_PATH: &str = "VIEWGEN_INPUT";

/// Output directory for the file sink
pub const ENV_OUTPUT_DIR: &str = "VIEWGEN_OUTPUT_DIR";

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Default input topic name
pub const DEFAULT_INPUT_TOPIC: &str = "enriched-spans";

/// Default consumer group of the partition drivers
pub const DEFAULT_CONSUMER_GROUP: &str = "view-generator";

/// Default number of input partitions (one driver each)
pub const DEFAULT_PARTITIONS: u32 = 4;

/// Default bound on one fetch before the driver re-checks shutdown
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1_000;

/// Default bound on one publish acknowledgement
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on partitions
pub const MAX_PARTITIONS: u32 = 1_024;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for drivers to finish during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Poll interval while waiting for a replayed input to be fully committed
pub const INPUT_DRAIN_POLL_MS: u64 = 50;
