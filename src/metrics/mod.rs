mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub use server::{configure, ServiceName};

// ============================================================================
// Metrics - Prometheus instrumentation
// ============================================================================
//
// One registry per process. Every service exposes it on GET /metrics.
//
// - orders: created / rejected by reason / debit outcome unknown
// - ledger: request latency and outcome per operation
// - outbox: published / failed / dead-lettered
// - consumers: processed / failed per consumer group
// - circuit breakers: current state per breaker
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub orders_rejected: IntCounterVec,
    pub debits_outcome_unknown: IntCounter,

    pub ledger_requests: IntCounterVec,
    pub ledger_request_duration: HistogramVec,

    pub outbox_published: IntCounter,
    pub outbox_publish_failures: IntCounter,
    pub dlq_messages_total: IntCounter,

    pub consumer_messages_processed: IntCounterVec,
    pub consumer_messages_failed: IntCounterVec,

    pub circuit_breaker_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders confirmed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Orders rejected or failed, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let debits_outcome_unknown = IntCounter::new(
            "debits_outcome_unknown_total",
            "Debits that failed transiently after the order was persisted; check ledger_entries",
        )?;
        registry.register(Box::new(debits_outcome_unknown.clone()))?;

        let ledger_requests = IntCounterVec::new(
            Opts::new("ledger_requests_total", "Ledger operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(ledger_requests.clone()))?;

        let ledger_request_duration = HistogramVec::new(
            HistogramOpts::new("ledger_request_duration_seconds", "Ledger operation latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(ledger_request_duration.clone()))?;

        let outbox_published = IntCounter::new("outbox_published_total", "Outbox messages published")?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_publish_failures = IntCounter::new(
            "outbox_publish_failures_total",
            "Outbox messages that exhausted their retry budget",
        )?;
        registry.register(Box::new(outbox_publish_failures.clone()))?;

        let dlq_messages_total = IntCounter::new("dlq_messages_total", "Messages moved to the dead letter queue")?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let consumer_messages_processed = IntCounterVec::new(
            Opts::new("consumer_messages_processed_total", "Bus messages handled successfully"),
            &["consumer"],
        )?;
        registry.register(Box::new(consumer_messages_processed.clone()))?;

        let consumer_messages_failed = IntCounterVec::new(
            Opts::new("consumer_messages_failed_total", "Bus messages dropped after a handler failure"),
            &["consumer", "reason"],
        )?;
        registry.register(Box::new(consumer_messages_failed.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_rejected,
            debits_outcome_unknown,
            ledger_requests,
            ledger_request_duration,
            outbox_published,
            outbox_publish_failures,
            dlq_messages_total,
            consumer_messages_processed,
            consumer_messages_failed,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_rejected(&self, reason: &str) {
        self.orders_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_ledger_call(&self, operation: &str, duration_secs: f64, outcome: &str) {
        self.ledger_requests.with_label_values(&[operation, outcome]).inc();
        self.ledger_request_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_consumed(&self, consumer: &str) {
        self.consumer_messages_processed.with_label_values(&[consumer]).inc();
    }

    pub fn record_consume_failure(&self, consumer: &str, reason: &str) {
        self.consumer_messages_failed
            .with_label_values(&[consumer, reason])
            .inc();
    }

    pub fn record_dlq_message(&self) {
        self.dlq_messages_total.inc();
    }

    pub fn breaker_gauge(&self, breaker: &str) -> IntGauge {
        self.circuit_breaker_state.with_label_values(&[breaker])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Option<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .and_then(|m| m.metric.first().and_then(|v| v.counter.value))
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        assert!(!metrics.registry().gather().is_empty());
        assert_eq!(counter_value(&metrics, "orders_created_total"), Some(1.0));
    }

    #[test]
    fn test_record_order_rejected_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_rejected("INSUFFICIENT_BALANCE");
        metrics.record_order_rejected("PRODUCT_NOT_FOUND");
        metrics.record_order_rejected("INSUFFICIENT_BALANCE");

        let gathered = metrics.registry().gather();
        let rejected = gathered
            .iter()
            .find(|m| m.name() == "orders_rejected_total")
            .unwrap();
        assert_eq!(rejected.metric.len(), 2);
    }

    #[test]
    fn test_record_dlq_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dlq_message();
        metrics.record_dlq_message();
        assert_eq!(counter_value(&metrics, "dlq_messages_total"), Some(2.0));
    }
}
