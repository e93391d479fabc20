//! In-memory topic backend
//!
//! Each topic is a fixed set of partitions; each partition is an ordered log
//! with per-consumer-group delivery state (next offset, pending set, acked
//! count). Subscribers are woken through a per-partition `Notify`.
//!
//! ## Limitations
//!
//! - Process exit = all messages lost (no persistence)
//! - One active consumer per (group, partition); a second subscriber of the
//!   same pair rewinds the group to its oldest unacknowledged message
//! - Logs are trimmed to `max_len` per partition, oldest first, but only
//!   past entries every known consumer group has acknowledged

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{
    StreamMessage, StreamPosition, StreamStats, StreamSubscription, TopicBackend,
    partition_for_key,
};
use super::error::TopicError;

/// Default partition log max length (trimmed on publish)
const DEFAULT_STREAM_MAX_LEN: usize = 100_000;

struct StreamEntry {
    offset: u64,
    key: String,
    payload: Vec<u8>,
}

/// Consumer group state for one partition
#[derive(Default)]
struct ConsumerGroup {
    /// Next offset to deliver
    next_offset: u64,
    /// Delivered, not yet acknowledged
    pending: BTreeSet<u64>,
    acked: u64,
}

#[derive(Default)]
struct PartitionLog {
    messages: VecDeque<StreamEntry>,
    next_offset: u64,
    groups: HashMap<String, ConsumerGroup>,
}

impl ConsumerGroup {
    /// Lowest offset the group may still need: oldest pending or next undelivered
    fn low_watermark(&self) -> u64 {
        self.pending
            .first()
            .copied()
            .map_or(self.next_offset, |p| p.min(self.next_offset))
    }
}

impl PartitionLog {
    /// Drop the oldest entries beyond `max_len` that every group has committed
    ///
    /// Entries a group has not yet received or acknowledged are kept, so a
    /// slow group lets the log grow past `max_len` instead of losing records.
    fn trim(&mut self, max_len: usize) {
        let watermark = self
            .groups
            .values()
            .map(ConsumerGroup::low_watermark)
            .min()
            .unwrap_or(u64::MAX);

        while self.messages.len() > max_len
            && self
                .messages
                .front()
                .is_some_and(|entry| entry.offset < watermark)
        {
            self.messages.pop_front();
        }
    }

    /// Take the next undelivered message for a group and mark it pending
    fn next_delivery(&mut self, group: &str, partition: u32) -> Option<StreamMessage> {
        let cg = self.groups.entry(group.to_string()).or_default();
        // Offsets are contiguous from the front entry
        let front = self.messages.front()?.offset;
        let index = cg.next_offset.saturating_sub(front);
        let entry = self.messages.get(usize::try_from(index).ok()?)?;

        cg.pending.insert(entry.offset);
        cg.next_offset = entry.offset + 1;
        Some(StreamMessage {
            position: StreamPosition {
                partition,
                offset: entry.offset,
            },
            key: entry.key.clone(),
            payload: entry.payload.clone(),
        })
    }
}

/// Shared state for memory backend
struct SharedState {
    /// Partition logs by topic name
    streams: RwLock<HashMap<String, Vec<PartitionLog>>>,
    /// Per-partition notifiers for immediate subscriber wakeup
    notifiers: RwLock<HashMap<(String, u32), Arc<Notify>>>,
    partitions: u32,
    max_len: usize,
    closed: AtomicBool,
}

impl SharedState {
    fn new_partitions(&self) -> Vec<PartitionLog> {
        (0..self.partitions).map(|_| PartitionLog::default()).collect()
    }

    fn check_partition(&self, partition: u32) -> Result<(), TopicError> {
        if partition < self.partitions {
            Ok(())
        } else {
            Err(TopicError::UnknownPartition {
                partition,
                partitions: self.partitions,
            })
        }
    }
}

/// In-memory topic backend
#[derive(Clone)]
pub struct MemoryTopicBackend {
    state: Arc<SharedState>,
}

impl MemoryTopicBackend {
    /// Create a backend whose topics all have `partitions` partitions
    pub fn new(partitions: u32) -> Self {
        Self::with_max_len(partitions, DEFAULT_STREAM_MAX_LEN)
    }

    /// Create with a custom per-partition log length
    pub fn with_max_len(partitions: u32, max_len: usize) -> Self {
        Self {
            state: Arc::new(SharedState {
                streams: RwLock::new(HashMap::new()),
                notifiers: RwLock::new(HashMap::new()),
                partitions: partitions.max(1),
                max_len: max_len.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get or create a Notify for a topic partition
    fn get_or_create_notifier(&self, topic: &str, partition: u32) -> Arc<Notify> {
        let key = (topic.to_string(), partition);
        {
            let notifiers = self.state.notifiers.read();
            if let Some(n) = notifiers.get(&key) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.state.notifiers.write();
        Arc::clone(notifiers.entry(key).or_insert_with(|| Arc::new(Notify::new())))
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    fn partitions(&self) -> u32 {
        self.state.partitions
    }

    async fn stream_publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<StreamPosition, TopicError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(TopicError::ChannelClosed);
        }

        let partition = partition_for_key(key, self.state.partitions);
        let offset = {
            let mut streams = self.state.streams.write();
            let logs = streams
                .entry(topic.to_string())
                .or_insert_with(|| self.state.new_partitions());
            let log = &mut logs[partition as usize];

            let offset = log.next_offset;
            log.next_offset += 1;
            log.messages.push_back(StreamEntry {
                offset,
                key: key.to_string(),
                payload: payload.to_vec(),
            });
            log.trim(self.state.max_len);
            offset
        };

        self.get_or_create_notifier(topic, partition).notify_one();

        Ok(StreamPosition { partition, offset })
    }

    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        partition: u32,
    ) -> Result<StreamSubscription, TopicError> {
        self.state.check_partition(partition)?;

        // Rewind to the oldest unacknowledged message
        {
            let mut streams = self.state.streams.write();
            let logs = streams
                .entry(topic.to_string())
                .or_insert_with(|| self.state.new_partitions());
            let cg = logs[partition as usize]
                .groups
                .entry(group.to_string())
                .or_default();
            if let Some(&oldest) = cg.pending.first() {
                cg.next_offset = oldest;
            }
            cg.pending.clear();
        }

        let topic = topic.to_string();
        let group = group.to_string();
        let state = Arc::clone(&self.state);
        let notifier = self.get_or_create_notifier(&topic, partition);

        let stream = stream! {
            loop {
                if state.closed.load(Ordering::Acquire) {
                    break;
                }

                // Scope the lock to avoid holding across await
                let next = {
                    let mut streams = state.streams.write();
                    streams
                        .get_mut(&topic)
                        .and_then(|logs| logs[partition as usize].next_delivery(&group, partition))
                };

                match next {
                    Some(msg) => yield Ok(msg),
                    None => notifier.notified().await,
                }
            }
        };

        Ok(StreamSubscription {
            partition,
            receiver: Box::pin(stream),
        })
    }

    async fn stream_ack(
        &self,
        topic: &str,
        group: &str,
        position: StreamPosition,
    ) -> Result<(), TopicError> {
        self.state.check_partition(position.partition)?;

        let mut streams = self.state.streams.write();
        let logs = streams
            .get_mut(topic)
            .ok_or_else(|| TopicError::Stream(format!("stream not found: {}", topic)))?;

        let cg = logs[position.partition as usize]
            .groups
            .get_mut(group)
            .ok_or_else(|| {
                TopicError::ConsumerGroup(format!("consumer group not found: {}", group))
            })?;

        if cg.pending.remove(&position.offset) {
            cg.acked += 1;
        }
        Ok(())
    }

    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, TopicError> {
        let streams = self.state.streams.read();
        let Some(logs) = streams.get(topic) else {
            return Ok(StreamStats::default());
        };

        let mut stats = StreamStats::default();
        for log in logs {
            stats.published += log.next_offset;
            stats.length += log.messages.len() as u64;
            if let Some(cg) = log.groups.get(group) {
                stats.pending += cg.pending.len() as u64;
                stats.acked += cg.acked;
            }
        }
        Ok(stats)
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        for notifier in self.state.notifiers.read().values() {
            // Wake current waiters and leave a permit for a subscriber about to wait
            notifier.notify_waiters();
            notifier.notify_one();
        }
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(TopicError::ChannelClosed);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
