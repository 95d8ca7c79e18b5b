use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{AddToDlq, DlqActor};
use crate::messaging::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::store::{OutboxMessage, OutboxStore, StoreError};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Outbox Relay Actor - Publishes confirmed order events to the bus
// ============================================================================
//
// Every `poll_interval` the relay:
// 1. Claims unpublished outbox rows, oldest first, for `claim_lease`
// 2. Publishes each one keyed by order id, with exponential backoff
// 3. Marks it published, or after the retry budget hands it to the DlqActor
//    and marks it dead-lettered so it is not polled again
//
// Claims let several order-service replicas run a relay against one outbox
// without publishing a row twice. When the broker circuit breaker is open the
// rest of the cycle is skipped and its rows are released for the next tick.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// How long a claimed batch is reserved for this relay; must outlast a cycle
    pub claim_lease: Duration,
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            claim_lease: Duration::from_secs(60),
            retry: RetryConfig::aggressive(),
        }
    }
}

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    dlq: ActorRef<DlqActor>,
    metrics: Arc<Metrics>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        dlq: ActorRef<DlqActor>,
        metrics: Arc<Metrics>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            dlq,
            metrics,
            config,
        }
    }

    async fn dead_letter(
        &self,
        message: &OutboxMessage,
        error: &PublishError,
        attempts: u32,
        first_failed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let added = self
            .dlq
            .ask(AddToDlq {
                id: message.id,
                aggregate_id: message.aggregate_id,
                event_type: message.event_type.clone(),
                topic: message.topic.clone(),
                payload: message.payload.clone(),
                error_message: error.to_string(),
                failure_count: attempts as i32,
                first_failed_at,
            })
            .await;

        if let Err(e) = added {
            // Released; the next cycle retries it
            tracing::error!(event_id = %message.id, error = %e, "Failed to dead-letter outbox message");
            self.outbox.release(&[message.id]).await?;
            return Ok(false);
        }

        self.outbox.mark_dead_lettered(message.id, attempts as i32).await?;
        self.metrics.outbox_publish_failures.inc();
        Ok(true)
    }
}

impl Actor for OutboxRelay {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(
            poll_interval_ms = state.config.poll_interval.as_millis() as u64,
            batch_size = state.config.batch_size,
            "OutboxRelay started"
        );

        let poll_interval = state.config.poll_interval;
        let relay = actor_ref.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + poll_interval;
            let mut interval = tokio::time::interval_at(start, poll_interval);
            loop {
                interval.tick().await;

                // ask, not tell: a failed cycle must not stop the actor
                match relay.ask(PollOutbox).await {
                    Ok(report) if report.published + report.dead_lettered > 0 => {
                        tracing::debug!(
                            published = report.published,
                            dead_lettered = report.dead_lettered,
                            "Outbox cycle finished"
                        );
                    }
                    Ok(_) => {}
                    Err(kameo::error::SendError::ActorNotRunning(_)) | Err(kameo::error::SendError::ActorStopped) => {
                        tracing::info!("OutboxRelay stopped, ending poll loop");
                        break;
                    }
                    Err(e) => tracing::error!(error = %e, "Outbox cycle failed"),
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Run one relay cycle now.
#[derive(Debug, Clone, Copy)]
pub struct PollOutbox;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelayReport {
    pub published: usize,
    pub dead_lettered: usize,
}

impl Message<PollOutbox> for OutboxRelay {
    type Reply = Result<RelayReport, StoreError>;

    async fn handle(&mut self, _msg: PollOutbox, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let pending = self
            .outbox
            .fetch_pending(self.config.batch_size, self.config.claim_lease)
            .await?;
        let mut report = RelayReport::default();

        for (index, message) in pending.iter().enumerate() {
            let publisher = &self.publisher;
            let mut attempts = 0;
            let first_attempt_at = Utc::now();

            let result = retry_on_transient(self.config.retry.clone(), |attempt| {
                attempts = attempt;
                async move {
                    publisher
                        .publish(&message.topic, &message.partition_key, &message.payload)
                        .await
                }
            })
            .await;

            match result {
                RetryResult::Success(()) => {
                    self.outbox.mark_published(message.id, attempts as i32).await?;
                    self.metrics.outbox_published.inc();
                    report.published += 1;

                    tracing::info!(
                        event_id = %message.id,
                        order_id = %message.aggregate_id,
                        topic = %message.topic,
                        "Published outbox message"
                    );
                }
                RetryResult::PermanentFailure(PublishError::CircuitOpen) => {
                    let deferred: Vec<Uuid> = pending[index..].iter().map(|m| m.id).collect();
                    tracing::warn!(remaining = deferred.len(), "Broker circuit open, deferring outbox cycle");
                    self.outbox.release(&deferred).await?;
                    break;
                }
                RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                    tracing::error!(
                        event_id = %message.id,
                        order_id = %message.aggregate_id,
                        attempts = attempts,
                        error = %e,
                        "Outbox message exhausted its retry budget, sending to DLQ"
                    );
                    if self.dead_letter(message, &e, attempts, first_attempt_at).await? {
                        report.dead_lettered += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::GetDeadLetters;
    use crate::messaging::InMemoryBus;
    use crate::store::{InMemoryDeadLetterStore, InMemoryOrderStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Fails the first `failures` publishes, then succeeds.
    struct FlakyPublisher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, _topic: &str, _key: &str, _payload: &str) -> Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PublishError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct OpenCircuit;

    #[async_trait]
    impl EventPublisher for OpenCircuit {
        async fn publish(&self, _topic: &str, _key: &str, _payload: &str) -> Result<(), PublishError> {
            Err(PublishError::CircuitOpen)
        }
    }

    fn fast_config() -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_secs(3600),
            batch_size: 10,
            claim_lease: Duration::from_secs(60),
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
        }
    }

    fn outbox_message(order_id: Uuid) -> OutboxMessage {
        OutboxMessage {
            id: Uuid::new_v4(),
            aggregate_id: order_id,
            event_type: "OrderConfirmed".to_string(),
            topic: "order-events".to_string(),
            partition_key: order_id.to_string(),
            payload: format!("{{\"orderId\":\"{}\"}}", order_id),
            created_at: Utc::now(),
        }
    }

    struct Harness {
        store: Arc<InMemoryOrderStore>,
        dlq: ActorRef<DlqActor>,
        metrics: Arc<Metrics>,
    }

    impl Harness {
        fn new() -> Self {
            let metrics = Arc::new(Metrics::new().unwrap());
            let dlq = DlqActor::spawn(DlqActor::new(Arc::new(InMemoryDeadLetterStore::new()), metrics.clone()));
            Self {
                store: Arc::new(InMemoryOrderStore::new()),
                dlq,
                metrics,
            }
        }

        fn relay(&self, publisher: Arc<dyn EventPublisher>) -> ActorRef<OutboxRelay> {
            OutboxRelay::spawn(OutboxRelay::new(
                self.store.clone(),
                publisher,
                self.dlq.clone(),
                self.metrics.clone(),
                fast_config(),
            ))
        }
    }

    #[tokio::test]
    async fn test_publishes_pending_messages_keyed_by_order() {
        let harness = Harness::new();
        let bus = InMemoryBus::new();
        let message = outbox_message(Uuid::new_v4());
        harness.store.enqueue(message.clone());

        let relay = harness.relay(bus.clone());
        let report = relay.ask(PollOutbox).await.unwrap();

        assert_eq!(report, RelayReport { published: 1, dead_lettered: 0 });
        assert_eq!(bus.published_count("order-events"), 1);
        assert_eq!(harness.store.outbox_state(message.id), Some((true, false, 1)));

        // Nothing left for the next cycle
        let report = relay.ask(PollOutbox).await.unwrap();
        assert_eq!(report, RelayReport::default());
        assert_eq!(harness.metrics.outbox_published.get(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_within_budget() {
        let harness = Harness::new();
        let message = outbox_message(Uuid::new_v4());
        harness.store.enqueue(message.clone());

        let publisher = Arc::new(FlakyPublisher {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let relay = harness.relay(publisher.clone());
        let report = relay.ask(PollOutbox).await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.store.outbox_state(message.id), Some((true, false, 3)));
    }

    #[tokio::test]
    async fn test_exhausted_messages_are_dead_lettered() {
        let harness = Harness::new();
        let message = outbox_message(Uuid::new_v4());
        harness.store.enqueue(message.clone());

        let publisher = Arc::new(FlakyPublisher {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let relay = harness.relay(publisher.clone());
        let report = relay.ask(PollOutbox).await.unwrap();

        assert_eq!(report, RelayReport { published: 0, dead_lettered: 1 });
        assert_eq!(harness.store.outbox_state(message.id), Some((false, true, 3)));

        let letters = harness.dlq.ask(GetDeadLetters { limit: 10 }).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].id, message.id);
        assert_eq!(letters[0].aggregate_id, message.aggregate_id);
        assert_eq!(letters[0].failure_count, 3);
        assert!(letters[0].first_failed_at >= message.created_at);

        // Not polled again
        let report = relay.ask(PollOutbox).await.unwrap();
        assert_eq!(report, RelayReport::default());
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.metrics.outbox_publish_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_defers_the_cycle() {
        let harness = Harness::new();
        let message = outbox_message(Uuid::new_v4());
        harness.store.enqueue(message.clone());

        let relay = harness.relay(Arc::new(OpenCircuit));
        let report = relay.ask(PollOutbox).await.unwrap();

        assert_eq!(report, RelayReport::default());
        assert_eq!(harness.store.outbox_state(message.id), Some((false, false, 0)));
        let letters = harness.dlq.ask(GetDeadLetters { limit: 10 }).await.unwrap();
        assert!(letters.is_empty());

        // Released, so the next cycle (or another relay) picks it up at once
        let bus = InMemoryBus::new();
        let recovered = harness.relay(bus.clone());
        let report = recovered.ask(PollOutbox).await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(bus.published_count("order-events"), 1);
    }

    #[tokio::test]
    async fn test_two_relays_never_publish_the_same_row() {
        let harness = Harness::new();
        for _ in 0..4 {
            harness.store.enqueue(outbox_message(Uuid::new_v4()));
        }

        let bus = InMemoryBus::new();
        let first = harness.relay(bus.clone());
        let second = harness.relay(bus.clone());

        let (a, b) = tokio::join!(first.ask(PollOutbox), second.ask(PollOutbox));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.published + b.published, 4);
        assert_eq!(bus.published_count("order-events"), 4);
        assert_eq!(harness.metrics.outbox_published.get(), 4);
    }
}
