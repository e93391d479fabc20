use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::views::registry::default_channel;
use crate::domain::views::{ConfigurationError, RoutePolicy, SchemaRegistry, ViewType};
use crate::utils::file::{expand_path, is_plain_file_name};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CONSUMER_GROUP, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_INPUT_TOPIC, DEFAULT_PARTITIONS, DEFAULT_PUBLISH_TIMEOUT_MS, MAX_PARTITIONS,
};

// =============================================================================
// File Config Structures (for JSON parsing)
// =============================================================================

/// Pipeline section of the config file
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    pub input_topic: Option<String>,
    pub consumer_group: Option<String>,
    pub partitions: Option<u32>,
    pub fetch_timeout_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
    pub max_publish_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

/// Per-view section of the config file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ViewFileConfig {
    pub enabled: Option<bool>,
    pub channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InputFileConfig {
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    pub dir: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub pipeline: Option<PipelineFileConfig>,
    pub views: Option<BTreeMap<ViewType, ViewFileConfig>>,
    pub input: Option<InputFileConfig>,
    pub output: Option<OutputFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        // Pipeline
        if let Some(pipeline) = other.pipeline {
            let current = self
                .pipeline
                .get_or_insert_with(PipelineFileConfig::default);
            if pipeline.input_topic.is_some() {
                tracing::trace!(input_topic = ?pipeline.input_topic, "Merging pipeline.input_topic");
                current.input_topic = pipeline.input_topic;
            }
            if pipeline.consumer_group.is_some() {
                tracing::trace!(consumer_group = ?pipeline.consumer_group, "Merging pipeline.consumer_group");
                current.consumer_group = pipeline.consumer_group;
            }
            if pipeline.partitions.is_some() {
                tracing::trace!(partitions = ?pipeline.partitions, "Merging pipeline.partitions");
                current.partitions = pipeline.partitions;
            }
            if pipeline.fetch_timeout_ms.is_some() {
                tracing::trace!(fetch_timeout_ms = ?pipeline.fetch_timeout_ms, "Merging pipeline.fetch_timeout_ms");
                current.fetch_timeout_ms = pipeline.fetch_timeout_ms;
            }
            if pipeline.publish_timeout_ms.is_some() {
                tracing::trace!(publish_timeout_ms = ?pipeline.publish_timeout_ms, "Merging pipeline.publish_timeout_ms");
                current.publish_timeout_ms = pipeline.publish_timeout_ms;
            }
            if pipeline.max_publish_attempts.is_some() {
                tracing::trace!(max_publish_attempts = ?pipeline.max_publish_attempts, "Merging pipeline.max_publish_attempts");
                current.max_publish_attempts = pipeline.max_publish_attempts;
            }
            if pipeline.retry_base_delay_ms.is_some() {
                tracing::trace!(retry_base_delay_ms = ?pipeline.retry_base_delay_ms, "Merging pipeline.retry_base_delay_ms");
                current.retry_base_delay_ms = pipeline.retry_base_delay_ms;
            }
        }

        // Views (merged per view type)
        if let Some(views) = other.views {
            let current = self.views.get_or_insert_with(BTreeMap::new);
            for (view_type, view) in views {
                let entry = current.entry(view_type).or_default();
                if view.enabled.is_some() {
                    tracing::trace!(view = %view_type, enabled = ?view.enabled, "Merging views.enabled");
                    entry.enabled = view.enabled;
                }
                if view.channel.is_some() {
                    tracing::trace!(view = %view_type, channel = ?view.channel, "Merging views.channel");
                    entry.channel = view.channel;
                }
            }
        }

        // Input
        if let Some(input) = other.input
            && input.path.is_some()
        {
            tracing::trace!(path = ?input.path, "Merging input.path");
            self.input.get_or_insert_with(InputFileConfig::default).path = input.path;
        }

        // Output
        if let Some(output) = other.output
            && output.dir.is_some()
        {
            tracing::trace!(dir = ?output.dir, "Merging output.dir");
            self.output.get_or_insert_with(OutputFileConfig::default).dir = output.dir;
        }
    }
}

// =============================================================================
// Application Config Structures
// =============================================================================

/// Partition drivers and output publishing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_topic: String,
    pub consumer_group: String,
    pub partitions: u32,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub max_publish_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_topic: DEFAULT_INPUT_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            partitions: DEFAULT_PARTITIONS,
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
            max_publish_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    /// Enabled view types and their output channels
    pub views: BTreeMap<ViewType, String>,
    /// JSON lines file replayed into the input topic
    pub input_path: Option<PathBuf>,
    /// Directory of the file sink; the topic sink is used when unset
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration with priority: defaults -> profile file -> local/CLI file -> CLI/env
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.viewgen/viewgen.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;

        tracing::debug!(
            input_topic = %config.pipeline.input_topic,
            partitions = config.pipeline.partitions,
            views = ?config.views,
            input = ?config.input_path,
            output_dir = ?config.output_dir,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let defaults = PipelineConfig::default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_views = file_config.views.unwrap_or_default();

        let pipeline = PipelineConfig {
            input_topic: cli
                .input_topic
                .clone()
                .or(file_pipeline.input_topic)
                .unwrap_or(defaults.input_topic),
            consumer_group: cli
                .consumer_group
                .clone()
                .or(file_pipeline.consumer_group)
                .unwrap_or(defaults.consumer_group),
            partitions: cli
                .partitions
                .or(file_pipeline.partitions)
                .unwrap_or(defaults.partitions),
            fetch_timeout: cli
                .fetch_timeout_ms
                .or(file_pipeline.fetch_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            publish_timeout: cli
                .publish_timeout_ms
                .or(file_pipeline.publish_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
            max_publish_attempts: cli
                .max_publish_attempts
                .or(file_pipeline.max_publish_attempts)
                .unwrap_or(defaults.max_publish_attempts),
            retry_base_delay_ms: cli
                .retry_base_delay_ms
                .or(file_pipeline.retry_base_delay_ms)
                .unwrap_or(defaults.retry_base_delay_ms),
        };

        // --views replaces the enabled set; per-view file settings apply otherwise
        let mut views = BTreeMap::new();
        for view_type in ViewType::ALL {
            let file_view = file_views.get(&view_type).cloned().unwrap_or_default();
            let enabled = match &cli.views {
                Some(selected) => selected.contains(&view_type),
                None => file_view.enabled.unwrap_or(true),
            };
            if !enabled {
                continue;
            }
            let channel = cli
                .channels
                .iter()
                .rev()
                .find(|(v, _)| *v == view_type)
                .map(|(_, c)| c.clone())
                .or(file_view.channel)
                .unwrap_or_else(|| default_channel(view_type).to_string());
            views.insert(view_type, channel);
        }

        let input_path = cli.input.clone().or_else(|| {
            file_config
                .input
                .and_then(|i| i.path)
                .map(|p| expand_path(&p))
        });
        let output_dir = cli.output_dir.clone().or_else(|| {
            file_config
                .output
                .and_then(|o| o.dir)
                .map(|d| expand_path(&d))
        });

        Self {
            pipeline,
            views,
            input_path,
            output_dir,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let p = &self.pipeline;
        if p.input_topic.trim().is_empty() {
            return Err(invalid("pipeline.input_topic", "must not be empty"));
        }
        if p.consumer_group.trim().is_empty() {
            return Err(invalid("pipeline.consumer_group", "must not be empty"));
        }
        if p.partitions == 0 || p.partitions > MAX_PARTITIONS {
            return Err(invalid(
                "pipeline.partitions",
                format!("must be between 1 and {MAX_PARTITIONS}, got {}", p.partitions),
            ));
        }
        if p.fetch_timeout.is_zero() {
            return Err(invalid("pipeline.fetch_timeout_ms", "must be greater than 0"));
        }
        if p.publish_timeout.is_zero() {
            return Err(invalid("pipeline.publish_timeout_ms", "must be greater than 0"));
        }
        if p.max_publish_attempts == 0 {
            return Err(invalid("pipeline.max_publish_attempts", "must be at least 1"));
        }
        if self.views.is_empty() {
            return Err(ConfigurationError::NoViewsEnabled);
        }
        // The file sink writes `<output_dir>/<channel>.jsonl`
        if self.output_dir.is_some()
            && let Some((view_type, _)) = self
                .views
                .iter()
                .find(|(_, channel)| !is_plain_file_name(channel.trim()))
        {
            return Err(ConfigurationError::UnresolvedChannel(*view_type));
        }
        // Channel uniqueness and blank channels are rejected by the registry
        self.schema_registry().map(|_| ())
    }

    /// Registry with every enabled view bound to its resolved channel
    pub fn schema_registry(&self) -> Result<SchemaRegistry, ConfigurationError> {
        self.views
            .iter()
            .fold(SchemaRegistry::builder(), |b, (view_type, channel)| {
                b.bind(*view_type, channel.clone())
            })
            .build()
    }

    pub fn route_policy(&self) -> RoutePolicy {
        RoutePolicy {
            max_attempts: self.pipeline.max_publish_attempts,
            base_delay_ms: self.pipeline.retry_base_delay_ms,
            publish_timeout: self.pipeline.publish_timeout,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}

/// Get the profile config path (~/.viewgen/viewgen.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_json(cli: &CliConfig, json: &str) -> AppConfig {
        let file_config: FileConfig = serde_json::from_str(json).unwrap();
        AppConfig::resolve(cli, file_config)
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "pipeline": { "input_topic": "spans", "partitions": 8, "max_publish_attempts": 5 },
            "views": { "api_call": { "channel": "apis" }, "span_event": { "enabled": false } },
            "input": { "path": "/data/spans.jsonl" },
            "output": { "dir": "/data/out" }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let pipeline = config.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.input_topic.as_deref(), Some("spans"));
        assert_eq!(pipeline.partitions, Some(8));
        assert_eq!(pipeline.max_publish_attempts, Some(5));

        let views = config.views.as_ref().unwrap();
        assert_eq!(views[&ViewType::ApiCall].channel.as_deref(), Some("apis"));
        assert_eq!(views[&ViewType::SpanEvent].enabled, Some(false));
        assert_eq!(
            config.input.as_ref().unwrap().path.as_deref(),
            Some("/data/spans.jsonl")
        );
        assert_eq!(
            config.output.as_ref().unwrap().dir.as_deref(),
            Some("/data/out")
        );
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.pipeline.is_none());
        assert!(config.views.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "pipeline": { "partitions": 2 }, "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pipeline.as_ref().unwrap().partitions, Some(2));
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_file_config_rejects_unknown_view_type() {
        let json = r#"{ "views": { "metrics": { "enabled": true } } }"#;
        assert!(serde_json::from_str::<FileConfig>(json).is_err());
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{
                "pipeline": { "input_topic": "base", "partitions": 2 },
                "views": { "api_call": { "channel": "apis", "enabled": true } }
            }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{
                "pipeline": { "partitions": 16 },
                "views": { "api_call": { "enabled": false }, "backend_call": { "channel": "be" } },
                "output": { "dir": "/tmp/out" }
            }"#,
        )
        .unwrap();

        base.merge(overlay);

        let pipeline = base.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.input_topic.as_deref(), Some("base"));
        assert_eq!(pipeline.partitions, Some(16));

        let views = base.views.as_ref().unwrap();
        assert_eq!(views[&ViewType::ApiCall].enabled, Some(false));
        assert_eq!(views[&ViewType::ApiCall].channel.as_deref(), Some("apis"));
        assert_eq!(views[&ViewType::BackendCall].channel.as_deref(), Some("be"));
        assert_eq!(base.output.as_ref().unwrap().dir.as_deref(), Some("/tmp/out"));
    }

    #[test]
    fn test_resolve_defaults() {
        let config = resolve_json(&CliConfig::default(), "{}");

        assert_eq!(config.pipeline.input_topic, DEFAULT_INPUT_TOPIC);
        assert_eq!(config.pipeline.consumer_group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(config.pipeline.partitions, DEFAULT_PARTITIONS);
        assert_eq!(config.pipeline.max_publish_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.views.len(), ViewType::ALL.len());
        for view_type in ViewType::ALL {
            assert_eq!(config.views[&view_type], default_channel(view_type));
        }
        assert!(config.input_path.is_none());
        assert!(config.output_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let cli = CliConfig {
            partitions: Some(3),
            publish_timeout_ms: Some(250),
            channels: vec![(ViewType::ApiCall, "cli-apis".to_string())],
            ..Default::default()
        };
        let config = resolve_json(
            &cli,
            r#"{
                "pipeline": { "partitions": 8, "input_topic": "from-file" },
                "views": { "api_call": { "channel": "file-apis" } }
            }"#,
        );

        assert_eq!(config.pipeline.partitions, 3);
        assert_eq!(config.pipeline.input_topic, "from-file");
        assert_eq!(config.pipeline.publish_timeout, Duration::from_millis(250));
        assert_eq!(config.views[&ViewType::ApiCall], "cli-apis");
    }

    #[test]
    fn test_resolve_cli_views_replace_enabled_set() {
        let cli = CliConfig {
            views: Some(vec![ViewType::SpanEvent]),
            ..Default::default()
        };
        let config = resolve_json(&cli, r#"{ "views": { "api_call": { "enabled": true } } }"#);

        assert_eq!(config.views.keys().copied().collect::<Vec<_>>(), vec![
            ViewType::SpanEvent
        ]);
    }

    #[test]
    fn test_resolve_file_disables_view() {
        let config = resolve_json(
            &CliConfig::default(),
            r#"{ "views": { "backend_call": { "enabled": false } } }"#,
        );
        assert!(!config.views.contains_key(&ViewType::BackendCall));
        assert_eq!(config.views.len(), ViewType::ALL.len() - 1);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let base = resolve_json(&CliConfig::default(), "{}");

        let mut config = base.clone();
        config.pipeline.partitions = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidSetting { name: "pipeline.partitions", .. })
        ));

        let mut config = base.clone();
        config.pipeline.partitions = MAX_PARTITIONS + 1;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.pipeline.max_publish_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.pipeline.publish_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.views.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::NoViewsEnabled)
        ));
    }

    #[test]
    fn test_validate_rejects_shared_channel() {
        let cli = CliConfig {
            channels: vec![
                (ViewType::ApiCall, "shared".to_string()),
                (ViewType::SpanEvent, "shared".to_string()),
            ],
            ..Default::default()
        };
        let config = resolve_json(&cli, "{}");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::DuplicateChannel { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_path_channel_for_file_output() {
        let cli = CliConfig {
            channels: vec![(ViewType::ApiCall, "a/b".to_string())],
            ..Default::default()
        };
        // Topic channels are free-form
        assert!(resolve_json(&cli, "{}").validate().is_ok());

        let cli = CliConfig {
            output_dir: Some(PathBuf::from("/tmp/viewgen-out")),
            ..cli
        };
        assert!(matches!(
            resolve_json(&cli, "{}").validate(),
            Err(ConfigurationError::UnresolvedChannel(ViewType::ApiCall))
        ));

        let cli = CliConfig {
            channels: vec![(ViewType::SpanEvent, "..".to_string())],
            ..cli
        };
        assert!(matches!(
            resolve_json(&cli, "{}").validate(),
            Err(ConfigurationError::UnresolvedChannel(ViewType::SpanEvent))
        ));
    }

    #[test]
    fn test_route_policy_from_pipeline() {
        let cli = CliConfig {
            max_publish_attempts: Some(7),
            retry_base_delay_ms: Some(20),
            ..Default::default()
        };
        let policy = resolve_json(&cli, "{}").route_policy();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.base_delay_ms, 20);
        assert_eq!(
            policy.publish_timeout,
            Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_load_missing_config_file_fails() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/viewgen.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_load_from_cli_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(
            &path,
            r#"{ "pipeline": { "consumer_group": "custom-group" }, "views": { "service_call": { "enabled": false } } }"#,
        )
        .unwrap();
        let cli = CliConfig {
            config: Some(path),
            ..Default::default()
        };

        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.pipeline.consumer_group, "custom-group");
        assert!(!config.views.contains_key(&ViewType::ServiceCall));
    }
}
