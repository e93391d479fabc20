//! Output channel implementations
//!
//! - `TopicSink` - keyed stream topic per channel (in-process)
//! - `FileSink` - one JSON lines file per channel under an output directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::PublishError;
use super::router::ViewSink;
use super::view::ViewRecord;
use crate::data::topics::{TopicError, TopicService};
use crate::utils::file::jsonl_path;

// ============================================================================
// TOPIC SINK
// ============================================================================

/// Publishes each view record onto the stream topic named after its channel
pub struct TopicSink {
    topics: Arc<TopicService>,
}

impl TopicSink {
    pub fn new(topics: Arc<TopicService>) -> Self {
        Self { topics }
    }
}

#[async_trait]
impl ViewSink for TopicSink {
    async fn publish(&self, channel: &str, record: &ViewRecord) -> Result<(), PublishError> {
        self.topics
            .stream_topic::<ViewRecord>(channel)
            .publish(&record.key, record)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                TopicError::Serialization(msg) => PublishError::Serialization(msg),
                other => PublishError::Transient {
                    channel: channel.to_string(),
                    message: other.to_string(),
                },
            })
    }

    fn name(&self) -> &'static str {
        "topic"
    }
}

// ============================================================================
// FILE SINK
// ============================================================================

/// Appends view records as JSON lines to `<dir>/<channel>.jsonl`
pub struct FileSink {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl FileSink {
    /// Create the sink, creating the output directory if needed
    pub async fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a channel; channels must be plain file names
    pub fn channel_path(&self, channel: &str) -> Result<PathBuf, PublishError> {
        jsonl_path(&self.dir, channel).ok_or_else(|| PublishError::Io {
            channel: channel.to_string(),
            message: "channel is not a valid file name".to_string(),
        })
    }
}

#[async_trait]
impl ViewSink for FileSink {
    async fn publish(&self, channel: &str, record: &ViewRecord) -> Result<(), PublishError> {
        let io_err = |e: std::io::Error| PublishError::Io {
            channel: channel.to_string(),
            message: e.to_string(),
        };

        let mut line = record
            .to_json()
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut files = self.files.lock().await;
        if !files.contains_key(channel) {
            let path = self.channel_path(channel)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(io_err)?;
            files.insert(channel.to_string(), file);
        }

        let Some(file) = files.get_mut(channel) else {
            return Err(PublishError::Io {
                channel: channel.to_string(),
                message: "file handle missing".to_string(),
            });
        };
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
