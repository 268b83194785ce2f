//! In-memory bus for tests and local development.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use super::{Acknowledger, BusMessage, Delivery, DeliveryStream, MessageBus, MessageConsumer};
use crate::error::BusError;

const DEFAULT_PARTITIONS: usize = 8;

#[derive(Default)]
struct Log {
    /// topic -> partition -> messages
    topics: HashMap<String, Vec<Vec<BusMessage>>>,
    /// (topic, group) -> partition -> next offset to deliver
    offsets: HashMap<(String, String), Vec<usize>>,
    failing_topics: HashSet<String>,
}

struct Inner {
    partitions: usize,
    log: RwLock<Log>,
    published: watch::Sender<u64>,
    unavailable: AtomicBool,
    lost_acks: AtomicU32,
}

/// Partitioned in-memory log with consumer groups.
///
/// Messages are placed on a partition by a hash of their key and kept in
/// publish order per partition. Each consumer group tracks one offset per
/// partition; a delivery advances it only when acknowledged, so an
/// unacknowledged message is delivered again on the next poll. Members of
/// one group share offsets and can both receive a message that neither has
/// acknowledged yet.
///
/// Outages can be injected: the whole bus, single topics, or lost
/// acknowledgements (the message is stored but the publisher sees a
/// timeout).
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                log: RwLock::new(Log::default()),
                published,
                unavailable: AtomicBool::new(false),
                lost_acks: AtomicU32::new(0),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Partition a key is written to.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as usize
    }

    /// Makes every publish fail until called with `true`.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Makes publishes to one topic fail.
    pub async fn fail_topic(&self, topic: &str) {
        self.inner.log.write().await.failing_topics.insert(topic.to_string());
    }

    pub async fn heal_topic(&self, topic: &str) {
        self.inner.log.write().await.failing_topics.remove(topic);
    }

    /// Stores the next `n` messages but reports a timeout to the publisher.
    pub fn lose_next_acks(&self, n: u32) {
        self.inner.lost_acks.store(n, Ordering::SeqCst);
    }

    /// Every message of a topic, partition by partition.
    pub async fn messages(&self, topic: &str) -> Vec<BusMessage> {
        let log = self.inner.log.read().await;
        log.topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Messages of one partition in publish order.
    pub async fn partition_messages(&self, topic: &str, partition: usize) -> Vec<BusMessage> {
        let log = self.inner.log.read().await;
        log.topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition))
            .cloned()
            .unwrap_or_default()
    }

    /// Messages with this key across all topics, in publish order.
    pub async fn messages_for_key(&self, key: &str) -> Vec<BusMessage> {
        let partition = self.partition_for(key);
        let log = self.inner.log.read().await;
        let mut messages: Vec<BusMessage> = log
            .topics
            .values()
            .flat_map(|partitions| partitions[partition].iter())
            .filter(|message| message.key == key)
            .cloned()
            .collect();
        messages.sort_by_key(sequence_of);
        messages
    }

    pub async fn count(&self, topic: &str) -> usize {
        let log = self.inner.log.read().await;
        log.topics
            .get(topic)
            .map_or(0, |partitions| partitions.iter().map(Vec::len).sum())
    }

    /// Messages of a topic the group has not acknowledged yet.
    pub async fn lag(&self, topic: &str, group: &str) -> usize {
        let log = self.inner.log.read().await;
        let Some(partitions) = log.topics.get(topic) else {
            return 0;
        };
        let offsets = log.offsets.get(&(topic.to_string(), group.to_string()));
        partitions
            .iter()
            .enumerate()
            .map(|(p, messages)| {
                let committed = offsets.map_or(0, |o| o[p]);
                messages.len() - committed
            })
            .sum()
    }

    async fn next_message(
        &self,
        topic: &str,
        group: &str,
        cursor: &mut usize,
    ) -> Option<(usize, usize, BusMessage)> {
        let log = self.inner.log.read().await;
        let partitions = log.topics.get(topic)?;
        let offsets = log.offsets.get(&(topic.to_string(), group.to_string()))?;

        let n = self.inner.partitions;
        for i in 0..n {
            let p = (*cursor + i) % n;
            if let Some(message) = partitions[p].get(offsets[p]) {
                *cursor = (p + 1) % n;
                return Some((p, offsets[p], message.clone()));
            }
        }
        None
    }

    async fn commit(&self, topic: &str, group: &str, partition: usize, offset: usize) {
        let mut log = self.inner.log.write().await;
        if let Some(offsets) = log.offsets.get_mut(&(topic.to_string(), group.to_string()))
            && offsets[partition] == offset
        {
            offsets[partition] = offset + 1;
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

const SEQUENCE_HEADER: &str = "x-memory-sequence";

fn sequence_of(message: &BusMessage) -> u64 {
    message
        .header(SEQUENCE_HEADER)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, mut message: BusMessage) -> Result<(), BusError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("in-memory bus is down".into()));
        }

        let partition = self.partition_for(&message.key);
        {
            let mut log = self.inner.log.write().await;
            if log.failing_topics.contains(&message.topic) {
                return Err(BusError::Unavailable(format!(
                    "topic {} is down",
                    message.topic
                )));
            }

            let sequence = *self.inner.published.borrow() + 1;
            message.headers.insert(SEQUENCE_HEADER.to_string(), sequence.to_string());
            let n = self.inner.partitions;
            log.topics
                .entry(message.topic.clone())
                .or_insert_with(|| vec![Vec::new(); n])[partition]
                .push(message);
            self.inner.published.send_replace(sequence);
        }

        let lost = self
            .inner
            .lost_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(BusError::Timeout(Duration::ZERO));
        }
        Ok(())
    }
}

struct MemoryAcker {
    bus: InMemoryBus,
    topic: String,
    group: String,
    partition: usize,
    offset: usize,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        self.bus
            .commit(&self.topic, &self.group, self.partition, self.offset)
            .await;
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), BusError> {
        Ok(())
    }
}

struct Subscription {
    bus: InMemoryBus,
    topic: String,
    group: String,
    published: watch::Receiver<u64>,
    cursor: usize,
}

#[async_trait]
impl MessageConsumer for InMemoryBus {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream, BusError> {
        {
            let n = self.inner.partitions;
            let mut log = self.inner.log.write().await;
            log.topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); n]);
            log.offsets
                .entry((topic.to_string(), group.to_string()))
                .or_insert_with(|| vec![0; n]);
        }

        let subscription = Subscription {
            bus: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            published: self.inner.published.subscribe(),
            cursor: 0,
        };

        let stream = futures_util::stream::unfold(subscription, |mut sub| async move {
            loop {
                sub.published.borrow_and_update();
                if let Some((partition, offset, message)) =
                    sub.bus.next_message(&sub.topic, &sub.group, &mut sub.cursor).await
                {
                    let acker = MemoryAcker {
                        bus: sub.bus.clone(),
                        topic: sub.topic.clone(),
                        group: sub.group.clone(),
                        partition,
                        offset,
                    };
                    let delivery = Delivery::new(message, Box::new(acker));
                    return Some((Ok(delivery), sub));
                }
                if sub.published.changed().await.is_err() {
                    return None;
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::StreamExt;

    use super::*;

    fn message(topic: &str, key: &str, body: &str) -> BusMessage {
        BusMessage::new(topic, key, Bytes::from(body.to_string()))
    }

    #[tokio::test]
    async fn same_key_keeps_publish_order() {
        let bus = InMemoryBus::with_partitions(4);
        for i in 0..5 {
            bus.publish(message("t", "k1", &i.to_string())).await.unwrap();
            bus.publish(message("t", "k2", &i.to_string())).await.unwrap();
        }

        let partition = bus.partition_for("k1");
        let bodies: Vec<_> = bus
            .partition_messages("t", partition)
            .await
            .into_iter()
            .filter(|m| m.key == "k1")
            .map(|m| m.payload)
            .collect();
        let expected: Vec<_> = (0..5).map(|i| Bytes::from(i.to_string())).collect();
        assert_eq!(bodies, expected);
        assert_eq!(bus.count("t").await, 10);
    }

    #[tokio::test]
    async fn outage_rejects_publishes() {
        let bus = InMemoryBus::new();
        bus.set_available(false);
        let err = bus.publish(message("t", "k", "x")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(bus.count("t").await, 0);

        bus.set_available(true);
        bus.publish(message("t", "k", "x")).await.unwrap();
        assert_eq!(bus.count("t").await, 1);
    }

    #[tokio::test]
    async fn failing_topic_only_affects_that_topic() {
        let bus = InMemoryBus::new();
        bus.fail_topic("bad").await;

        assert!(bus.publish(message("bad", "k", "x")).await.is_err());
        bus.publish(message("good", "k", "x")).await.unwrap();

        bus.heal_topic("bad").await;
        bus.publish(message("bad", "k", "x")).await.unwrap();
    }

    #[tokio::test]
    async fn lost_ack_still_stores_the_message() {
        let bus = InMemoryBus::new();
        bus.lose_next_acks(1);

        let err = bus.publish(message("t", "k", "x")).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout(_)));
        assert_eq!(bus.count("t").await, 1);

        bus.publish(message("t", "k", "y")).await.unwrap();
    }

    #[tokio::test]
    async fn unacked_delivery_is_redelivered() {
        let bus = InMemoryBus::new();
        bus.publish(message("t", "k", "first")).await.unwrap();
        bus.publish(message("t", "k", "second")).await.unwrap();
        let mut stream = bus.subscribe("t", "g").await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.message().payload, Bytes::from("first"));
        delivery.nack().await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.message().payload, Bytes::from("first"));
        delivery.ack().await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.message().payload, Bytes::from("second"));
        delivery.ack().await.unwrap();
        assert_eq!(bus.lag("t", "g").await, 0);
    }

    #[tokio::test]
    async fn groups_track_progress_independently() {
        let bus = InMemoryBus::new();
        let mut audit = bus.subscribe("t", "audit").await.unwrap();
        let _search = bus.subscribe("t", "search").await.unwrap();

        bus.publish(message("t", "k", "x")).await.unwrap();
        audit.next().await.unwrap().unwrap().ack().await.unwrap();

        assert_eq!(bus.lag("t", "audit").await, 0);
        assert_eq!(bus.lag("t", "search").await, 1);
    }

    #[tokio::test]
    async fn subscriber_wakes_on_publish() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("t", "g").await.unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(message("t", "k", "late")).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message().payload, Bytes::from("late"));
    }
}
