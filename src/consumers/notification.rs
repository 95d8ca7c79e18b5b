use async_trait::async_trait;
use std::sync::Arc;

use super::{ConsumerError, MessageHandler};
use crate::domain::order::OrderEvent;
use crate::messaging::BusMessage;

/// Delivers a notification for one confirmed order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<(), ConsumerError>;
}

/// Simulated email: renders the notification into the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), ConsumerError> {
        tracing::info!(
            order_id = %event.order_id,
            customer = %event.customer_name,
            email = %event.customer_email,
            total = %event.total_amount,
            items = event.item_count,
            status = %event.status,
            "ORDER NOTIFICATION RECEIVED"
        );
        tracing::info!(email = %event.customer_email, "Email notification sent");
        Ok(())
    }
}

/// Fire-and-forget: no retry, no dead letters. A payload that does not parse
/// is logged verbatim and dropped.
pub struct NotificationConsumer {
    notifier: Arc<dyn Notifier>,
}

impl NotificationConsumer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl MessageHandler for NotificationConsumer {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, message: &BusMessage) -> Result<(), ConsumerError> {
        let event = OrderEvent::decode(&message.payload).map_err(|e| {
            tracing::warn!(payload = %message.payload, error = %e, "Received unparseable order event");
            e
        })?;

        self.notifier.notify(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::run_subscriber;
    use crate::domain::order::OrderStatus;
    use crate::messaging::{EventPublisher, InMemoryBus};
    use crate::metrics::Metrics;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &OrderEvent) -> Result<(), ConsumerError> {
            self.sent
                .lock()
                .unwrap()
                .push((event.order_id, event.customer_email.clone()));
            Ok(())
        }
    }

    fn event() -> OrderEvent {
        OrderEvent {
            order_id: Uuid::now_v7(),
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            order_date: Utc::now(),
            status: OrderStatus::Confirmed,
            total_amount: Decimal::new(4500, 2),
            item_count: 0,
            items: Vec::new(),
        }
    }

    fn message(payload: &str) -> BusMessage {
        BusMessage {
            topic: "order-events".to_string(),
            key: None,
            payload: payload.to_string(),
            partition: 0,
            offset: 0,
        }
    }

    #[tokio::test]
    async fn test_notifies_customer_of_confirmed_order() {
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = NotificationConsumer::new(notifier.clone());
        let event = event();

        consumer.handle(&message(&event.encode().unwrap())).await.unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(*sent, vec![(event.order_id, "alice@example.com".to_string())]);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = NotificationConsumer::new(notifier.clone());

        let result = consumer.handle(&message("not json")).await;

        assert!(matches!(result, Err(ConsumerError::Parse(_))));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_keeps_going_after_bad_message() {
        let bus = InMemoryBus::with_partitions(1);
        let first = event();
        let second = event();
        bus.publish("order-events", "a", &first.encode().unwrap()).await.unwrap();
        bus.publish("order-events", "a", "{\"orderId\": 42}").await.unwrap();
        bus.publish("order-events", "a", &second.encode().unwrap()).await.unwrap();
        bus.close();

        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = Arc::new(NotificationConsumer::new(notifier.clone()));
        run_subscriber(
            Arc::new(bus.subscribe("order-notification-group", "order-events")),
            consumer,
            Arc::new(Metrics::new().unwrap()),
        )
        .await;

        let ids: Vec<Uuid> = notifier.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![first.order_id, second.order_id]);
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_events() {
        assert!(LogNotifier.notify(&event()).await.is_ok());
    }
}
