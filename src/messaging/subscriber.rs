use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};

use super::{BusMessage, ConsumeError, MessageSource};

/// Kafka consumer in its own group. Auto-commit is off: offsets advance only
/// after a handler is done with a message.
pub struct KafkaSubscriber {
    consumer: StreamConsumer,
}

impl KafkaSubscriber {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()?;

        consumer.subscribe(&[topic])?;

        tracing::info!(group_id = %group_id, topic = %topic, "Subscribed to topic");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSubscriber {
    async fn next_message(&self) -> Result<Option<BusMessage>, ConsumeError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| ConsumeError::Broker(e.to_string()))?;

        Ok(Some(BusMessage {
            topic: message.topic().to_string(),
            key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: String::from_utf8_lossy(message.payload().unwrap_or_default()).into_owned(),
            partition: message.partition(),
            offset: message.offset(),
        }))
    }

    async fn commit(&self, message: &BusMessage) -> Result<(), ConsumeError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| ConsumeError::Broker(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| ConsumeError::Broker(e.to_string()))
    }
}
