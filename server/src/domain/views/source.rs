//! Input boundary of the pipeline driver

use async_trait::async_trait;

use super::record::EnrichedRecord;
use crate::data::topics::{StreamAcker, StreamPosition, StreamTopicSubscriber, TopicError};

/// One fetched input record, not yet decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Commit handle
    pub cursor: StreamPosition,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Ordered, at-least-once record input for one partition
#[async_trait]
pub trait RecordSource: Send {
    /// Next delivery; `Ok(None)` once the input is closed
    async fn fetch(&mut self) -> Result<Option<Delivery>, TopicError>;

    /// Acknowledge the delivery at `cursor` as processed
    async fn commit(&mut self, cursor: StreamPosition) -> Result<(), TopicError>;

    fn partition(&self) -> u32;
}

/// Record source over one partition of the input stream topic
pub struct TopicSource {
    subscriber: StreamTopicSubscriber<EnrichedRecord>,
    acker: StreamAcker,
}

impl TopicSource {
    pub fn new(subscriber: StreamTopicSubscriber<EnrichedRecord>) -> Self {
        let acker = subscriber.acker();
        Self { subscriber, acker }
    }
}

#[async_trait]
impl RecordSource for TopicSource {
    async fn fetch(&mut self) -> Result<Option<Delivery>, TopicError> {
        match self.subscriber.recv_raw().await {
            None => Ok(None),
            Some(msg) => {
                let msg = msg?;
                Ok(Some(Delivery {
                    cursor: msg.position,
                    key: msg.key,
                    payload: msg.payload,
                }))
            }
        }
    }

    async fn commit(&mut self, cursor: StreamPosition) -> Result<(), TopicError> {
        self.acker.ack(cursor).await
    }

    fn partition(&self) -> u32 {
        self.subscriber.partition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::topics::TopicService;

    #[tokio::test]
    async fn test_topic_source_fetch_and_commit() {
        let topics = TopicService::new(1);
        let input = topics.stream_topic::<EnrichedRecord>("spans");
        input.publish_raw("trace-1", b"{\"key\":\"trace-1\"}").await.unwrap();

        let mut source = TopicSource::new(input.subscribe("views", 0).await.unwrap());
        let delivery = source.fetch().await.unwrap().unwrap();
        assert_eq!(delivery.key, "trace-1");
        assert_eq!(source.partition(), 0);

        source.commit(delivery.cursor).await.unwrap();
        let stats = topics.stream_stats("spans", "views").await.unwrap();
        assert_eq!(stats.acked, 1);

        topics.shutdown();
        assert_eq!(source.fetch().await.unwrap(), None);
    }
}
