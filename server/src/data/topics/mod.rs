//! Partitioned stream topics
//!
//! Keyed, at-least-once streams with a pluggable backend. The in-memory
//! backend is the only one shipped; the trait keeps the pipeline independent
//! of it.
//!
//! - `StreamTopic<T>`: typed JSON handle over a named topic
//! - `StreamTopicSubscriber<T>`: one partition of a topic for one consumer group
//! - `StreamAcker`: `Send + Sync` acknowledgment handle

mod backend;
mod error;
mod memory;

use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{
    StreamMessage, StreamPosition, StreamStats, StreamSubscription, TopicBackend,
    partition_for_key,
};
pub use error::TopicError;
pub use memory::MemoryTopicBackend;

// ============================================================================
// TOPIC SERVICE
// ============================================================================

/// Central topic service - owns the backend shared by all topics
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl TopicService {
    /// Create a topic service with an in-memory backend
    pub fn new(partitions: u32) -> Self {
        Self::with_backend(Arc::new(MemoryTopicBackend::new(partitions)))
    }

    pub fn with_backend(backend: Arc<dyn TopicBackend>) -> Self {
        Self { backend }
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn partitions(&self) -> u32 {
        self.backend.partitions()
    }

    /// Typed handle to a stream topic
    pub fn stream_topic<T>(&self, name: &str) -> StreamTopic<T>
    where
        T: Serialize + DeserializeOwned,
    {
        StreamTopic {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
            _phantom: PhantomData,
        }
    }

    /// Get stream statistics for monitoring
    pub async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        self.backend.stream_stats(topic, group).await
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }

    /// End every subscription; in-flight records are left unacknowledged
    pub fn shutdown(&self) {
        self.backend.close();
    }
}

// ============================================================================
// STREAM TOPIC
// ============================================================================

/// Stream topic carrying JSON-encoded `T`
pub struct StreamTopic<T> {
    name: String,
    backend: Arc<dyn TopicBackend>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for StreamTopic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: Arc::clone(&self.backend),
            _phantom: PhantomData,
        }
    }
}

impl<T> StreamTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Publish a message under a partition key
    pub async fn publish(&self, key: &str, msg: &T) -> Result<StreamPosition, TopicError> {
        let payload = serde_json::to_vec(msg)?;
        self.backend.stream_publish(&self.name, key, &payload).await
    }

    /// Publish pre-encoded bytes, bypassing the typed encoder
    pub async fn publish_raw(&self, key: &str, payload: &[u8]) -> Result<StreamPosition, TopicError> {
        self.backend.stream_publish(&self.name, key, payload).await
    }

    /// Subscribe a consumer group to one partition
    pub async fn subscribe(
        &self,
        group: &str,
        partition: u32,
    ) -> Result<StreamTopicSubscriber<T>, TopicError> {
        let subscription = self
            .backend
            .stream_subscribe(&self.name, group, partition)
            .await?;
        Ok(StreamTopicSubscriber {
            acker: StreamAcker {
                name: self.name.clone(),
                group: group.to_string(),
                backend: Arc::clone(&self.backend),
            },
            subscription,
            _phantom: PhantomData,
        })
    }

    /// Get the topic name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Acker for acknowledging stream messages (Send + Sync)
#[derive(Clone)]
pub struct StreamAcker {
    name: String,
    group: String,
    backend: Arc<dyn TopicBackend>,
}

impl StreamAcker {
    /// Acknowledge message processing complete
    pub async fn ack(&self, position: StreamPosition) -> Result<(), TopicError> {
        self.backend
            .stream_ack(&self.name, &self.group, position)
            .await
    }
}

/// Subscriber to one partition of a stream topic
pub struct StreamTopicSubscriber<T> {
    acker: StreamAcker,
    subscription: StreamSubscription,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> StreamTopicSubscriber<T>
where
    T: DeserializeOwned,
{
    /// Receive the next message without decoding it
    ///
    /// Returns `None` once the topic service shuts down.
    pub async fn recv_raw(&mut self) -> Option<Result<StreamMessage, TopicError>> {
        self.subscription.receiver.next().await
    }

    /// Receive and decode the next message
    pub async fn recv(&mut self) -> Result<(StreamPosition, T), TopicError> {
        let msg = self.recv_raw().await.ok_or(TopicError::ChannelClosed)??;
        let decoded = serde_json::from_slice(&msg.payload)?;
        Ok((msg.position, decoded))
    }

    pub fn partition(&self) -> u32 {
        self.subscription.partition
    }

    /// Get an acker for acknowledging messages (Send + Sync)
    pub fn acker(&self) -> StreamAcker {
        self.acker.clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================
