// ============================================================================
// Messaging - event bus seams
// ============================================================================
//
// - EventPublisher: used by the outbox relay
// - MessageSource:  used by the subscriber loops, one per consumer group
//
// Implementations:
// - redpanda / subscriber : rdkafka producer and consumer
// - memory                : partitioned in-process bus (tests, standalone)
//
// Both deliver messages with the same key through one partition, so a
// consumer group sees the events of one order in publish order.
//
// ============================================================================

pub mod memory;
mod redpanda;
mod subscriber;

use async_trait::async_trait;

use crate::utils::IsTransient;

pub use memory::{InMemoryBus, InMemorySubscription};
pub use redpanda::RedpandaPublisher;
pub use subscriber::KafkaSubscriber;

/// A message as delivered to a consumer group.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Message rejected by broker: {0}")]
    Rejected(String),

    #[error("Circuit breaker open for broker")]
    CircuitOpen,
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        // An open circuit is not worth retrying within the same cycle
        matches!(self, PublishError::Unavailable(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("Broker error: {0}")]
    Broker(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next message for this group, `None` once the source is closed.
    async fn next_message(&self) -> Result<Option<BusMessage>, ConsumeError>;

    /// Record that `message` (and everything before it in its partition) was handled.
    async fn commit(&self, message: &BusMessage) -> Result<(), ConsumeError>;
}
