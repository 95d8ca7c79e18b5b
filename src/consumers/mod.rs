// ============================================================================
// Consumers - downstream reactions to OrderEvents
// ============================================================================
//
// Each consumer runs its own subscriber loop in its own consumer group:
// - notification: renders a customer notification per confirmed order
// - analytics:    materializes the event into the star schema
//
// Delivery is at-least-once. The loop commits a message after its handler
// returns, whether the handler succeeded or dropped it, and never halts on a
// bad message.
//
// ============================================================================

pub mod analytics;
pub mod notification;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::FailureKind;
use crate::messaging::{BusMessage, MessageSource};
use crate::metrics::Metrics;
use crate::store::StoreError;
use crate::utils::IsTransient;

pub use analytics::{AnalyticsConfig, AnalyticsConsumer};
pub use notification::{LogNotifier, NotificationConsumer, Notifier};

const SOURCE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Malformed event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Warehouse write failed: {0}")]
    Store(#[from] StoreError),

    #[error("Notification failed: {0}")]
    Notify(String),
}

impl ConsumerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConsumerError::Parse(_) => FailureKind::Serialization,
            ConsumerError::Store(e) if e.is_transient() => FailureKind::DownstreamUnavailable,
            ConsumerError::Store(_) => FailureKind::Internal,
            ConsumerError::Notify(_) => FailureKind::DownstreamUnavailable,
        }
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Metrics label and log field
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &BusMessage) -> Result<(), ConsumerError>;
}

/// Feed every message from `source` to `handler` until the source closes.
pub async fn run_subscriber(source: Arc<dyn MessageSource>, handler: Arc<dyn MessageHandler>, metrics: Arc<Metrics>) {
    let consumer = handler.name();
    tracing::info!(consumer = consumer, "Subscriber loop started");

    loop {
        let message = match source.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!(consumer = consumer, "Message source closed, subscriber loop ending");
                break;
            }
            Err(e) => {
                tracing::error!(consumer = consumer, error = %e, "Failed to receive message");
                tokio::time::sleep(SOURCE_ERROR_BACKOFF).await;
                continue;
            }
        };

        tracing::debug!(
            consumer = consumer,
            partition = message.partition,
            offset = message.offset,
            key = ?message.key,
            "Received message"
        );

        match handler.handle(&message).await {
            Ok(()) => metrics.record_consumed(consumer),
            Err(e) => {
                tracing::warn!(
                    consumer = consumer,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Dropping message after handler failure"
                );
                metrics.record_consume_failure(consumer, e.kind().code());
            }
        }

        if let Err(e) = source.commit(&message).await {
            // Redelivered after a restart; handlers are idempotent
            tracing::warn!(consumer = consumer, offset = message.offset, error = %e, "Offset commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{EventPublisher, InMemoryBus};
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, message: &BusMessage) -> Result<(), ConsumerError> {
            self.seen.lock().unwrap().push(message.payload.clone());
            if message.payload == "bad" {
                serde_json::from_str::<serde_json::Value>("{")?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_commits_everything() {
        let bus = InMemoryBus::with_partitions(1);
        for payload in ["one", "bad", "three"] {
            bus.publish("order-events", "k", payload).await.unwrap();
        }
        bus.close();

        let metrics = Arc::new(Metrics::new().unwrap());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        run_subscriber(Arc::new(bus.subscribe("g", "order-events")), recorder.clone(), metrics.clone()).await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["one", "bad", "three"]);
        assert_eq!(metrics.consumer_messages_processed.with_label_values(&["recorder"]).get(), 2);
        assert_eq!(
            metrics
                .consumer_messages_failed
                .with_label_values(&["recorder", "SERIALIZATION_FAILURE"])
                .get(),
            1
        );

        // Everything was committed: a restarted group sees nothing new
        let restarted = bus.subscribe("g", "order-events");
        assert!(restarted.next_message().await.unwrap().is_none());
    }
}
