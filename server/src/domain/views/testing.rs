//! In-memory sinks for router and driver tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::PublishError;
use super::router::ViewSink;
use super::view::ViewRecord;

/// Records every publish in order, optionally after a delay
#[derive(Default)]
pub struct RecordingSink {
    delay: Option<Duration>,
    published: Mutex<Vec<(String, ViewRecord)>>,
}

impl RecordingSink {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            published: Mutex::default(),
        }
    }

    pub fn published(&self) -> Vec<(String, ViewRecord)> {
        self.published.lock().clone()
    }

    pub fn keys_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, r)| r.key.clone())
            .collect()
    }
}

#[async_trait]
impl ViewSink for RecordingSink {
    async fn publish(&self, channel: &str, record: &ViewRecord) -> Result<(), PublishError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.published
            .lock()
            .push((channel.to_string(), record.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fails the first `failures` publishes to one channel with a transient error
pub struct FlakySink {
    channel: String,
    remaining: AtomicU32,
    inner: RecordingSink,
}

impl FlakySink {
    pub fn failing_first(channel: &str, failures: u32) -> Self {
        Self {
            channel: channel.to_string(),
            remaining: AtomicU32::new(failures),
            inner: RecordingSink::default(),
        }
    }

    pub fn published(&self) -> Vec<(String, ViewRecord)> {
        self.inner.published()
    }
}

#[async_trait]
impl ViewSink for FlakySink {
    async fn publish(&self, channel: &str, record: &ViewRecord) -> Result<(), PublishError> {
        if channel == self.channel
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(PublishError::Transient {
                channel: channel.to_string(),
                message: "broker unavailable".to_string(),
            });
        }
        self.inner.publish(channel, record).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}
