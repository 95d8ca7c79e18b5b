use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use super::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-compatible producer guarded by the "broker" circuit breaker.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaPublisher {
    pub fn new(brokers: &str, metrics: &Metrics) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("broker", cb_config).with_gauge(metrics.breaker_gauge("broker")),
        })
    }
}

fn classify(error: KafkaError) -> PublishError {
    match error {
        KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageSizeTooLarge | RDKafkaErrorCode::InvalidMessage,
        ) => PublishError::Rejected(error.to_string()),
        other => PublishError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl EventPublisher for RedpandaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| classify(e))
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %topic, key = %key, "Published to broker");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(topic = %topic, "Circuit breaker open - broker unavailable");
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, key = %key, "Failed to publish to broker");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::IsTransient;

    #[test]
    fn test_oversized_messages_are_not_retried() {
        let error = classify(KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge));
        assert!(matches!(error, PublishError::Rejected(_)));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_timeouts_are_transient() {
        let error = classify(KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut));
        assert!(matches!(error, PublishError::Unavailable(_)));
        assert!(error.is_transient());
    }
}
