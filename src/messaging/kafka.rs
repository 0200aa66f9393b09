use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};
use std::time::Duration;
use uuid::Uuid;

use crate::error::QueueError;
use crate::messaging::OrderQueue;

// ============================================================================
// Kafka Order Queue
// ============================================================================

pub struct KafkaOrderQueue {
    producer: FutureProducer,
    topic: String,
}

impl KafkaOrderQueue {
    pub fn new(brokers: &str, topic: &str) -> Self {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .expect("Failed to create Kafka producer");

        Self {
            producer,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl OrderQueue for KafkaOrderQueue {
    async fn publish(&self, order_id: Uuid) -> Result<(), QueueError> {
        let key = order_id.to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&key);

        match self
            .producer
            .send(record, rdkafka::util::Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok(rdkafka::producer::future_producer::Delivery {
                partition, offset, ..
            }) => {
                tracing::info!(
                    topic = %self.topic,
                    order_id = %order_id,
                    partition,
                    offset,
                    "Published processing trigger"
                );
                Ok(())
            }
            Err((e, _)) => {
                tracing::error!(
                    topic = %self.topic,
                    order_id = %order_id,
                    error = %e,
                    "Failed to publish processing trigger"
                );
                Err(QueueError(e.to_string()))
            }
        }
    }
}
