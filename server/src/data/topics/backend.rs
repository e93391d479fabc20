//! Topic backend trait definition
//!
//! Keyed, partitioned streams with at-least-once delivery:
//! - `stream_publish` routes a key to a stable partition
//! - one consumer per (group, partition) receives messages in offset order
//! - `stream_ack` commits; unacknowledged messages are re-delivered to the
//!   next subscriber of the same group and partition

use std::hash::{Hash, Hasher};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use rustc_hash::FxHasher;

use super::error::TopicError;

/// Position of a message within a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamPosition {
    pub partition: u32,
    pub offset: u64,
}

impl std::fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.partition, self.offset)
    }
}

/// Message received from a stream with its position for acknowledgment
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub position: StreamPosition,
    /// Partition key the message was published with
    pub key: String,
    pub payload: Vec<u8>,
}

/// Subscription to one partition of a stream topic
pub struct StreamSubscription {
    pub partition: u32,
    /// Ends when the backend is closed
    pub receiver: Pin<Box<dyn Stream<Item = Result<StreamMessage, TopicError>> + Send>>,
}

/// Topic backend trait
#[async_trait]
pub trait TopicBackend: Send + Sync {
    /// Partition count shared by every topic of this backend
    fn partitions(&self) -> u32;

    /// Publish a keyed message; the same key always lands on the same partition
    async fn stream_publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<StreamPosition, TopicError>;

    /// Subscribe a consumer group to one partition
    ///
    /// Delivery resumes from the oldest message the group has not acknowledged.
    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<StreamSubscription, TopicError>;

    /// Acknowledge message processing complete
    async fn stream_ack(
        &self,
        topic: &str,
        group: &str,
        position: StreamPosition,
    ) -> Result<(), TopicError>;

    /// Get stream statistics for monitoring
    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError>;

    /// End all subscriptions; further publishes fail with `ChannelClosed`
    fn close(&self);

    /// Health check
    async fn health_check(&self) -> Result<(), TopicError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}

/// Stream statistics for monitoring (summed over partitions)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Messages ever published
    pub published: u64,
    /// Messages currently retained
    pub length: u64,
    /// Delivered to the group but not yet acknowledged
    pub pending: u64,
    /// Acknowledged by the group
    pub acked: u64,
}

/// Stable key → partition mapping
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions.max(1))) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_for_key_is_stable_and_in_range() {
        for key in ["trace-1", "trace-2", "", "svc-checkout"] {
            let p = partition_for_key(key, 4);
            assert!(p < 4);
            assert_eq!(p, partition_for_key(key, 4));
        }
        assert_eq!(partition_for_key("anything", 0), 0);
        assert_eq!(partition_for_key("anything", 1), 0);
    }

    #[test]
    fn test_position_display() {
        let pos = StreamPosition {
            partition: 2,
            offset: 17,
        };
        assert_eq!(pos.to_string(), "2-17");
    }
}
