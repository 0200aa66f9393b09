use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{MessageOutcome, StoreError};
use crate::metrics::Metrics;
use crate::models::OrderStatus;
use crate::store::{OrderStore, UpdateOutcome};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Order Processing Worker
// ============================================================================
//
// Consumes processing triggers and applies the NEW -> PROCESSED
// transition. Delivery is at-least-once, so the handler is idempotent:
// it re-reads the order, acts only on status NEW, and commits through a
// conditional update that re-checks NEW. Redeliveries and triggers made
// stale by concurrent updates or deletes are consumed as no-ops.
//
// Consumption auto-commits. When a message fails on infrastructure after
// the retry budget, it is logged, counted, and dropped: the order stays
// NEW and is re-enqueued manually via update(status=NEW). Dropping
// beats redelivery here because a broken message would loop forever and
// the conditional commit already makes a lost trigger recoverable.
//
// ============================================================================

pub struct ProcessingWorker {
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
    processing_delay: Duration,
    retry: RetryConfig,
}

impl ProcessingWorker {
    pub fn new(
        store: Arc<dyn OrderStore>,
        metrics: Arc<Metrics>,
        processing_delay: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            processing_delay,
            retry: RetryConfig::default(),
        }
    }

    /// Handle one delivered message. Discard outcomes are expected and
    /// returned as values; only infrastructure failures that outlived
    /// the retry budget come back as `Err`.
    pub async fn handle_message(&self, payload: &str) -> Result<MessageOutcome, StoreError> {
        // 1. Poison guard: a payload that is not an order id would loop
        //    forever if requeued.
        let order_id = match Uuid::parse_str(payload.trim()) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(payload, error = %e, "Malformed queue payload, discarding");
                return Ok(MessageOutcome::Malformed);
            }
        };

        // 2. Re-read current state; the payload is only a trigger.
        let order = match retry_on_transient(&self.retry, || {
            let store = self.store.clone();
            async move { store.find_by_id(order_id).await }
        })
        .await
        {
            RetryResult::Success(order) => order,
            RetryResult::Exhausted(e) | RetryResult::PermanentFailure(e) => return Err(e),
        };

        let Some(order) = order else {
            tracing::debug!(order_id = %order_id, "Order gone before consumption, discarding");
            return Ok(MessageOutcome::Missing(order_id));
        };

        // 3. Idempotency guard: anything but NEW means a duplicate or
        //    stale delivery.
        if order.status != OrderStatus::New {
            tracing::info!(
                order_id = %order_id,
                status = %order.status,
                "Skipping order, status is not NEW"
            );
            return Ok(MessageOutcome::Stale(order_id, order.status));
        }

        tracing::info!(
            order_id = %order_id,
            customer_name = %order.customer_name,
            "Processing order"
        );

        // 4. The actual business work. Placeholder that blocks for the
        //    configured duration; no locks are held across it.
        let started = Instant::now();
        sleep(self.processing_delay).await;

        // 5. Conditional commit: only wins if the order is still NEW,
        //    closing the race with concurrent updates since step 2.
        let outcome = match retry_on_transient(&self.retry, || {
            let store = self.store.clone();
            async move { store.mark_processed(order_id, Utc::now()).await }
        })
        .await
        {
            RetryResult::Success(outcome) => outcome,
            RetryResult::Exhausted(e) | RetryResult::PermanentFailure(e) => return Err(e),
        };

        match outcome {
            UpdateOutcome::Updated(order) => {
                self.metrics
                    .processing_duration
                    .observe(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    processed_at = ?order.processed_at,
                    "Order marked PROCESSED"
                );
                Ok(MessageOutcome::Processed(order_id))
            }
            UpdateOutcome::Conflict(status) => {
                tracing::info!(
                    order_id = %order_id,
                    status = %status,
                    "Order changed during processing, leaving it untouched"
                );
                Ok(MessageOutcome::Lost(order_id))
            }
            UpdateOutcome::NotFound => {
                tracing::debug!(order_id = %order_id, "Order deleted during processing");
                Ok(MessageOutcome::Missing(order_id))
            }
        }
    }
}

// ============================================================================
// Consumer Loop
// ============================================================================

/// Run one queue consumer until the task is aborted. Every message is
/// handled in isolation; a failure is counted and dropped without
/// affecting other messages or the loop itself.
pub async fn run_consumer(
    worker: Arc<ProcessingWorker>,
    brokers: &str,
    group_id: &str,
    topic: &str,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[topic])?;

    tracing::info!(topic, group_id, "Order processing worker started");

    loop {
        match consumer.recv().await {
            Err(e) => tracing::error!(error = %e, "Queue receive error"),
            Ok(message) => {
                let payload = match message.payload_view::<str>() {
                    Some(Ok(payload)) => payload,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Non-UTF8 payload, discarding");
                        worker.metrics.record_discard("malformed");
                        continue;
                    }
                    None => {
                        tracing::error!("Empty payload, discarding");
                        worker.metrics.record_discard("malformed");
                        continue;
                    }
                };

                match worker.handle_message(payload).await {
                    Ok(MessageOutcome::Processed(_)) => {
                        worker.metrics.messages_processed.inc();
                    }
                    Ok(outcome) => {
                        worker.metrics.record_discard(outcome.reason());
                    }
                    Err(e) => {
                        // Acknowledged-drop policy: the order stays NEW
                        // and is reprocessed via update(status=NEW).
                        worker.metrics.record_discard("failed");
                        tracing::error!(
                            payload,
                            error = %e,
                            "Message handling failed, dropping; order remains reprocessable"
                        );
                    }
                }
            }
        }
    }
}

/// Start a pool of independent consumers in the same consumer group.
pub fn spawn_workers(
    count: usize,
    worker: Arc<ProcessingWorker>,
    brokers: String,
    group_id: String,
    topic: String,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count)
        .map(|n| {
            let worker = worker.clone();
            let brokers = brokers.clone();
            let group_id = group_id.clone();
            let topic = topic.clone();

            tokio::spawn(async move {
                if let Err(e) = run_consumer(worker, &brokers, &group_id, &topic).await {
                    tracing::error!(worker = n, error = %e, "Consumer failed to start");
                }
            })
        })
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryOrderQueue;
    use crate::service::{OrderService, UpdateOrderRequest};
    use crate::store::MemoryOrderStore;

    struct Fixture {
        store: Arc<MemoryOrderStore>,
        queue: Arc<MemoryOrderQueue>,
        service: OrderService,
        worker: ProcessingWorker,
    }

    fn setup() -> Fixture {
        let store = Arc::new(MemoryOrderStore::new());
        let queue = Arc::new(MemoryOrderQueue::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(store.clone(), queue.clone(), metrics.clone());
        let worker = ProcessingWorker::new(store.clone(), metrics, Duration::ZERO);

        Fixture {
            store,
            queue,
            service,
            worker,
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_poison() {
        let f = setup();
        let outcome = f.worker.handle_message("not-an-id").await.unwrap();
        assert_eq!(outcome, MessageOutcome::Malformed);
    }

    #[tokio::test]
    async fn test_missing_order_is_a_silent_no_op() {
        let f = setup();
        let id = Uuid::new_v4();
        let outcome = f.worker.handle_message(&id.to_string()).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Missing(id));
    }

    #[tokio::test]
    async fn test_new_order_transitions_to_processed() {
        let f = setup();
        let order = f.service.create("Alice", "Widget", 3).await.unwrap();
        let payload = f.queue.drain().pop().unwrap();

        let outcome = f.worker.handle_message(&payload).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Processed(order.id));

        let stored = f.store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let f = setup();
        let order = f.service.create("Alice", "Widget", 1).await.unwrap();
        let payload = f.queue.drain().pop().unwrap();

        let first = f.worker.handle_message(&payload).await.unwrap();
        assert_eq!(first, MessageOutcome::Processed(order.id));
        let processed_at = f
            .store
            .find_by_id(order.id)
            .await
            .unwrap()
            .unwrap()
            .processed_at;

        // Redelivery of the same message is a no-op.
        let second = f.worker.handle_message(&payload).await.unwrap();
        assert_eq!(
            second,
            MessageOutcome::Stale(order.id, OrderStatus::Processed)
        );

        let stored = f.store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.processed_at, processed_at);
    }

    #[tokio::test]
    async fn test_cancelled_order_is_never_overwritten() {
        let f = setup();
        let order = f.service.create("Alice", "Widget", 1).await.unwrap();
        let payload = f.queue.drain().pop().unwrap();

        // Cancelled between enqueue and consumption.
        f.service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("CANCELLED".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = f.worker.handle_message(&payload).await.unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Stale(order.id, OrderStatus::Cancelled)
        );

        let stored = f.store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert!(stored.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_consume_is_a_no_op() {
        let f = setup();
        let order = f.service.create("Alice", "Widget", 1).await.unwrap();
        let payload = f.queue.drain().pop().unwrap();

        assert!(f.service.delete(order.id).await.unwrap());

        let outcome = f.worker.handle_message(&payload).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Missing(order.id));
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_reprocessing() {
        let f = setup();

        // create -> NEW
        let order = f.service.create("Alice", "Widget", 3).await.unwrap();
        assert_eq!(order.status, OrderStatus::New);

        // worker processes -> PROCESSED
        let payload = f.queue.drain().pop().unwrap();
        f.worker.handle_message(&payload).await.unwrap();
        let stored = f.store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        assert!(stored.processed_at.is_some());

        // update(status="cancelled") -> CANCELLED
        let cancelled = f
            .service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("cancelled".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // update(status="new") -> NEW again, processed_at cleared,
        // exactly one fresh trigger enqueued.
        let reset = f
            .service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("new".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reset.status, OrderStatus::New);
        assert!(reset.processed_at.is_none());

        let payloads = f.queue.drain();
        assert_eq!(payloads, vec![order.id.to_string()]);

        // worker consumes the new trigger -> PROCESSED again
        f.worker.handle_message(&payloads[0]).await.unwrap();
        let stored = f.store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        assert!(stored.processed_at.is_some());
    }
}
