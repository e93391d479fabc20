//! Topic error types

use std::fmt;

/// Error type for topic operations
#[derive(Debug)]
pub enum TopicError {
    /// Topic service shut down
    ChannelClosed,
    /// Partition index outside the topic's partition count
    UnknownPartition { partition: u32, partitions: u32 },
    /// Serialization/deserialization error
    Serialization(String),
    /// Stream operation error
    Stream(String),
    /// Consumer group error
    ConsumerGroup(String),
    /// Configuration error
    Config(String),
}

impl TopicError {
    /// The consumer cannot keep reading after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TopicError::UnknownPartition { .. }
                | TopicError::ConsumerGroup(_)
                | TopicError::Config(_)
        )
    }
}

impl std::error::Error for TopicError {}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::ChannelClosed => write!(f, "channel closed"),
            TopicError::UnknownPartition {
                partition,
                partitions,
            } => write!(
                f,
                "partition {} out of range (topic has {} partitions)",
                partition, partitions
            ),
            TopicError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            TopicError::Stream(msg) => write!(f, "stream error: {}", msg),
            TopicError::ConsumerGroup(msg) => write!(f, "consumer group error: {}", msg),
            TopicError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<serde_json::Error> for TopicError {
    fn from(err: serde_json::Error) -> Self {
        TopicError::Serialization(err.to_string())
    }
}
