use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::{DeadLetter, DeadLetterStore};

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Owns writes to the dead letter queue. Outbox messages land here once the
// relay has spent their retry budget; operators list them through
// GET /dead-letters and replay by hand.
//
// ============================================================================

pub struct DlqActor {
    store: Arc<dyn DeadLetterStore>,
    metrics: Arc<Metrics>,
}

impl DlqActor {
    pub fn new(store: Arc<dyn DeadLetterStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }
}

impl Actor for DlqActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct AddToDlq {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GetDeadLetters {
    pub limit: i64,
}

// ============================================================================
// Handlers
// ============================================================================

impl Message<AddToDlq> for DlqActor {
    type Reply = Result<(), String>;

    async fn handle(&mut self, msg: AddToDlq, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::error!(
            event_id = %msg.id,
            event_type = %msg.event_type,
            aggregate_id = %msg.aggregate_id,
            error = %msg.error_message,
            failure_count = msg.failure_count,
            "Adding message to Dead Letter Queue"
        );

        let letter = DeadLetter {
            id: msg.id,
            aggregate_id: msg.aggregate_id,
            event_type: msg.event_type,
            topic: msg.topic,
            payload: msg.payload,
            error_message: msg.error_message,
            failure_count: msg.failure_count,
            first_failed_at: msg.first_failed_at,
            last_failed_at: Utc::now(),
        };

        self.store
            .add(letter)
            .await
            .map_err(|e| format!("Failed to insert into DLQ: {}", e))?;

        self.metrics.record_dlq_message();
        tracing::info!(event_id = %msg.id, "Message stored in DLQ");

        Ok(())
    }
}

impl Message<GetDeadLetters> for DlqActor {
    type Reply = Result<Vec<DeadLetter>, String>;

    async fn handle(&mut self, msg: GetDeadLetters, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.store
            .list(msg.limit)
            .await
            .map_err(|e| format!("Failed to query DLQ: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDeadLetterStore;

    fn add(id: Uuid, failure_count: i32) -> AddToDlq {
        AddToDlq {
            id,
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderConfirmed".to_string(),
            topic: "order-events".to_string(),
            payload: "{}".to_string(),
            error_message: "broker unavailable".to_string(),
            failure_count,
            first_failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_add_and_list_dead_letters() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(Arc::new(InMemoryDeadLetterStore::new()), metrics.clone()));

        let id = Uuid::new_v4();
        dlq.ask(add(id, 5)).await.unwrap();
        dlq.ask(add(Uuid::new_v4(), 5)).await.unwrap();

        let letters = dlq.ask(GetDeadLetters { limit: 10 }).await.unwrap();
        assert_eq!(letters.len(), 2);
        assert!(letters.iter().any(|l| l.id == id && l.failure_count == 5));
        assert_eq!(metrics.dlq_messages_total.get(), 2);
    }

    #[tokio::test]
    async fn test_readding_a_message_accumulates_failures() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(Arc::new(InMemoryDeadLetterStore::new()), metrics));

        let id = Uuid::new_v4();
        dlq.ask(add(id, 5)).await.unwrap();
        dlq.ask(add(id, 3)).await.unwrap();

        let letters = dlq.ask(GetDeadLetters { limit: 10 }).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].failure_count, 8);
    }
}
