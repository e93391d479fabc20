//! JSON lines replay into the input topic
//!
//! Each non-blank line is published unchanged under the line's `key` field.
//! Lines without a string `key` (or that are not JSON at all) are still
//! published, under a synthetic `line-<n>` key, so the pipeline reports them
//! as malformed instead of the feeder dropping them silently.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::topics::{StreamTopic, TopicError};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to publish input record: {0}")]
    Topic(#[from] TopicError),
}

/// Counts from one replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub published: u64,
    /// Published under a synthetic key
    pub unkeyed: u64,
    pub blank_lines: u64,
}

/// Partition key of one input line, if it carries one
fn line_key(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::Object(map) => map.get("key")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Publish every line of a JSON lines file onto `topic`
pub async fn replay_json_lines<T>(
    path: &Path,
    topic: &StreamTopic<T>,
) -> Result<ReplaySummary, InputError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut summary = ReplaySummary::default();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            summary.blank_lines += 1;
            continue;
        }

        let key = match line_key(line) {
            Some(key) => key,
            None => {
                summary.unkeyed += 1;
                tracing::debug!(line = line_no, "Input line has no key");
                format!("line-{line_no}")
            }
        };

        topic.publish_raw(&key, line.as_bytes()).await?;
        summary.published += 1;
    }

    tracing::debug!(
        path = %path.display(),
        published = summary.published,
        unkeyed = summary.unkeyed,
        "Input replayed"
    );
    Ok(summary)
}
