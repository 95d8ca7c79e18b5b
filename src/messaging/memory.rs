use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::{BusMessage, ConsumeError, EventPublisher, MessageSource, PublishError};

const DEFAULT_PARTITIONS: usize = 3;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process partitioned log. Topics are created on first publish; every
/// consumer group keeps its own committed offsets, so a new subscription in
/// the same group resumes after the last commit.
pub struct InMemoryBus {
    partitions: usize,
    state: Mutex<BusState>,
    notify: Notify,
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, Vec<Vec<BusMessage>>>,
    /// (group, topic, partition) -> next offset to deliver
    committed: HashMap<(String, String, i32), i64>,
    closed: bool,
}

impl InMemoryBus {
    pub fn new() -> Arc<Self> {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Arc<Self> {
        Arc::new(Self {
            partitions: partitions.max(1),
            state: Mutex::new(BusState::default()),
            notify: Notify::new(),
        })
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    pub fn subscribe(self: &Arc<Self>, group_id: &str, topic: &str) -> InMemorySubscription {
        let positions = {
            let state = guard(&self.state);
            (0..self.partitions as i32)
                .map(|p| {
                    let key = (group_id.to_string(), topic.to_string(), p);
                    (p, state.committed.get(&key).copied().unwrap_or(0))
                })
                .collect()
        };

        InMemorySubscription {
            bus: Arc::clone(self),
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            positions: Mutex::new(positions),
        }
    }

    /// Wake every subscriber; they drain what is left and then return `None`.
    pub fn close(&self) {
        guard(&self.state).closed = true;
        self.notify.notify_waiters();
    }

    /// Messages published to `topic`, across all partitions
    #[cfg(test)]
    pub fn published_count(&self, topic: &str) -> usize {
        guard(&self.state)
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let partition = self.partition_for(key);
        {
            let mut state = guard(&self.state);
            if state.closed {
                return Err(PublishError::Unavailable("bus closed".to_string()));
            }

            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); self.partitions]);
            let offset = log[partition].len() as i64;
            log[partition].push(BusMessage {
                topic: topic.to_string(),
                key: Some(key.to_string()),
                payload: payload.to_string(),
                partition: partition as i32,
                offset,
            });
        }

        self.notify.notify_waiters();
        Ok(())
    }
}

pub struct InMemorySubscription {
    bus: Arc<InMemoryBus>,
    group_id: String,
    topic: String,
    /// partition -> next offset to hand out
    positions: Mutex<HashMap<i32, i64>>,
}

impl InMemorySubscription {
    /// Next undelivered message, lowest partition first.
    fn poll(&self) -> Option<BusMessage> {
        let state = guard(&self.bus.state);
        let log = state.topics.get(&self.topic)?;
        let mut positions = guard(&self.positions);

        for (partition, messages) in log.iter().enumerate() {
            let position = positions.entry(partition as i32).or_insert(0);
            if let Some(message) = messages.get(*position as usize) {
                *position += 1;
                return Some(message.clone());
            }
        }
        None
    }
}

#[async_trait]
impl MessageSource for InMemorySubscription {
    async fn next_message(&self) -> Result<Option<BusMessage>, ConsumeError> {
        loop {
            let notified = self.bus.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.poll() {
                return Ok(Some(message));
            }
            if guard(&self.bus.state).closed {
                return Ok(None);
            }

            notified.await;
        }
    }

    async fn commit(&self, message: &BusMessage) -> Result<(), ConsumeError> {
        let key = (self.group_id.clone(), message.topic.clone(), message.partition);
        let mut state = guard(&self.bus.state);
        let committed = state.committed.entry(key).or_insert(0);
        *committed = (*committed).max(message.offset + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(subscription: &InMemorySubscription, count: usize) -> Vec<BusMessage> {
        let mut received = Vec::new();
        for _ in 0..count {
            received.push(subscription.next_message().await.unwrap().unwrap());
        }
        received
    }

    #[tokio::test]
    async fn test_same_key_keeps_publish_order() {
        let bus = InMemoryBus::new();
        for i in 0..5 {
            bus.publish("orders", "order-1", &format!("event-{}", i)).await.unwrap();
        }

        let subscription = bus.subscribe("group-a", "orders");
        let payloads: Vec<String> = drain(&subscription, 5).await.into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["event-0", "event-1", "event-2", "event-3", "event-4"]);
    }

    #[tokio::test]
    async fn test_groups_consume_independently() {
        let bus = InMemoryBus::new();
        bus.publish("orders", "k1", "a").await.unwrap();
        bus.publish("orders", "k2", "b").await.unwrap();

        let notifications = bus.subscribe("notifications", "orders");
        let analytics = bus.subscribe("analytics", "orders");

        assert_eq!(drain(&notifications, 2).await.len(), 2);
        assert_eq!(drain(&analytics, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_uncommitted_messages_are_redelivered_to_new_subscription() {
        let bus = InMemoryBus::with_partitions(1);
        bus.publish("orders", "k", "first").await.unwrap();
        bus.publish("orders", "k", "second").await.unwrap();

        let subscription = bus.subscribe("group", "orders");
        let first = subscription.next_message().await.unwrap().unwrap();
        subscription.commit(&first).await.unwrap();
        let _second = subscription.next_message().await.unwrap().unwrap();
        drop(subscription);

        // Restart without committing the second message
        let restarted = bus.subscribe("group", "orders");
        let replayed = restarted.next_message().await.unwrap().unwrap();
        assert_eq!(replayed.payload, "second");
    }

    #[tokio::test]
    async fn test_waiting_subscriber_wakes_on_publish() {
        let bus = InMemoryBus::new();
        let subscription = bus.subscribe("group", "orders");

        let waiter = tokio::spawn(async move { subscription.next_message().await.unwrap() });
        tokio::task::yield_now().await;
        bus.publish("orders", "k", "late").await.unwrap();

        let message = waiter.await.unwrap().unwrap();
        assert_eq!(message.payload, "late");
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let bus = InMemoryBus::new();
        let subscription = bus.subscribe("group", "orders");
        bus.close();

        assert!(subscription.next_message().await.unwrap().is_none());
        assert!(bus.publish("orders", "k", "x").await.is_err());
    }
}
