use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::messaging::OrderQueue;
use crate::metrics::Metrics;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::store::OrderStore;

// ============================================================================
// Order Lifecycle Service
// ============================================================================
//
// Validates commands, applies them to the order store, and enqueues a
// processing trigger whenever an order enters (or re-enters) NEW. Store
// and queue handles are passed in at construction; the service keeps no
// state of its own and can be called concurrently.
//
// The persist-then-enqueue ordering is load-bearing: the id must be
// durable before the trigger is published. If the publish fails after
// the write committed, the order is still returned as created in state
// NEW and stays recoverable through the status=NEW reprocessing path.
//
// ============================================================================

/// Caller-supplied fields for `update`. `None` means "no change";
/// `status` is accepted in any casing.
#[derive(Clone, Debug, Default)]
pub struct UpdateOrderRequest {
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<i32>,
    pub status: Option<String>,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    queue: Arc<dyn OrderQueue>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        queue: Arc<dyn OrderQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            queue,
            metrics,
        }
    }

    pub async fn create(
        &self,
        customer_name: &str,
        product_name: &str,
        quantity: i32,
    ) -> Result<Order, ServiceError> {
        let customer_name = customer_name.trim();
        let product_name = product_name.trim();

        if customer_name.is_empty() {
            return Err(ServiceError::Validation(
                "customer name must not be empty".to_string(),
            ));
        }
        if product_name.is_empty() {
            return Err(ServiceError::Validation(
                "product name must not be empty".to_string(),
            ));
        }
        if quantity <= 0 {
            return Err(ServiceError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }

        let order = self
            .store
            .insert(NewOrder {
                customer_name: customer_name.to_string(),
                product_name: product_name.to_string(),
                quantity,
                created_at: Utc::now(),
            })
            .await?;

        self.metrics.orders_created.inc();
        tracing::info!(
            order_id = %order.id,
            customer_name = %order.customer_name,
            quantity = order.quantity,
            "Order created"
        );

        self.enqueue_trigger(order.id).await;

        Ok(order)
    }

    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<Order, ServiceError> {
        let mut patch = OrderPatch::default();

        // Blank-but-present names mean "no change", matching the trim
        // rules applied at creation.
        if let Some(name) = request.customer_name {
            let name = name.trim();
            if !name.is_empty() {
                patch.customer_name = Some(name.to_string());
            }
        }
        if let Some(name) = request.product_name {
            let name = name.trim();
            if !name.is_empty() {
                patch.product_name = Some(name.to_string());
            }
        }

        if let Some(quantity) = request.quantity {
            if quantity <= 0 {
                return Err(ServiceError::Validation(
                    "quantity must be greater than zero".to_string(),
                ));
            }
            patch.quantity = Some(quantity);
        }

        let mut requeue = false;
        if let Some(status) = request.status.as_deref() {
            if !status.trim().is_empty() {
                let status: OrderStatus = status
                    .parse()
                    .map_err(|e: crate::models::ParseStatusError| {
                        ServiceError::Validation(e.to_string())
                    })?;
                patch.status = Some(status);

                // Setting NEW is a reprocessing request, whatever the
                // prior status was: the processing cycle starts over.
                if status == OrderStatus::New {
                    requeue = true;
                    patch.clear_processed_at = true;
                }
            }
        }

        let order = self
            .store
            .apply_patch(id, patch)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            requeue,
            "Order updated"
        );

        if requeue {
            self.metrics.orders_requeued.inc();
            self.enqueue_trigger(order.id).await;
        }

        Ok(order)
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// All orders, newest first. Read-only.
    pub async fn list(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.list().await?)
    }

    /// Returns whether the order existed. Deleting an order whose
    /// processing message is still in flight is fine; the worker
    /// discards messages for missing orders.
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let existed = self.store.delete(id).await?;
        tracing::info!(order_id = %id, existed, "Order deleted");
        Ok(existed)
    }

    /// Publish a processing trigger for an already-persisted order.
    /// A publish failure is logged and counted but never fails the
    /// calling operation: the order is durable in state NEW and can be
    /// re-enqueued via update(status=NEW).
    async fn enqueue_trigger(&self, order_id: Uuid) {
        if let Err(e) = self.queue.publish(order_id).await {
            self.metrics.enqueue_failures.inc();
            tracing::error!(
                order_id = %order_id,
                error = %e,
                "Failed to enqueue processing trigger; order stays NEW for manual reprocessing"
            );
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryOrderQueue;
    use crate::store::MemoryOrderStore;

    fn setup() -> (Arc<MemoryOrderStore>, Arc<MemoryOrderQueue>, OrderService) {
        let store = Arc::new(MemoryOrderStore::new());
        let queue = Arc::new(MemoryOrderQueue::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(store.clone(), queue.clone(), metrics);
        (store, queue, service)
    }

    #[tokio::test]
    async fn test_create_persists_new_order_and_enqueues_trigger() {
        let (_, queue, service) = setup();

        let order = service.create("  Alice ", "Widget", 3).await.unwrap();

        assert_eq!(order.customer_name, "Alice");
        assert_eq!(order.product_name, "Widget");
        assert_eq!(order.quantity, 3);
        assert_eq!(order.status, OrderStatus::New);
        assert!(order.processed_at.is_none());
        assert_eq!(queue.published(), vec![order.id.to_string()]);
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let (_, _, service) = setup();
        let a = service.create("Alice", "Widget", 1).await.unwrap();
        let b = service.create("Bob", "Widget", 1).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_side_effects() {
        let (store, queue, service) = setup();

        for (customer, product, quantity) in
            [("", "Widget", 1), ("Alice", "   ", 1), ("Alice", "Widget", 0)]
        {
            let result = service.create(customer, product, quantity).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }

        assert!(store.list().await.unwrap().is_empty());
        assert!(queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_create_survives_enqueue_failure() {
        let (store, queue, service) = setup();
        queue.set_failing(true);

        let order = service.create("Alice", "Widget", 1).await.unwrap();

        // The order is created and durable despite the failed publish.
        assert_eq!(order.status, OrderStatus::New);
        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert!(queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let (_, _, service) = setup();
        let result = service.update(Uuid::new_v4(), UpdateOrderRequest::default()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_fields_without_status_does_not_enqueue() {
        let (_, queue, service) = setup();
        let order = service.create("Alice", "Widget", 1).await.unwrap();
        queue.drain();

        let updated = service
            .update(
                order.id,
                UpdateOrderRequest {
                    customer_name: Some("  Bob  ".to_string()),
                    product_name: Some("   ".to_string()), // blank: no change
                    quantity: Some(5),
                    status: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.customer_name, "Bob");
        assert_eq!(updated.product_name, "Widget");
        assert_eq!(updated.quantity, 5);
        assert!(queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_bad_quantity_and_unknown_status() {
        let (_, _, service) = setup();
        let order = service.create("Alice", "Widget", 1).await.unwrap();

        let result = service
            .update(
                order.id,
                UpdateOrderRequest {
                    quantity: Some(-2),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let result = service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("SHIPPED".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_status_is_case_normalized() {
        let (_, _, service) = setup();
        let order = service.create("Alice", "Widget", 1).await.unwrap();

        let updated = service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("cancelled".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_reset_to_new_clears_processed_at_and_enqueues_once() {
        let (store, queue, service) = setup();
        let order = service.create("Alice", "Widget", 1).await.unwrap();
        queue.drain();

        // Simulate the worker having processed the order.
        store.mark_processed(order.id, Utc::now()).await.unwrap();

        let updated = service
            .update(
                order.id,
                UpdateOrderRequest {
                    status: Some("new".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::New);
        assert!(updated.processed_at.is_none());
        assert_eq!(queue.published(), vec![order.id.to_string()]);
    }

    #[tokio::test]
    async fn test_list_returns_newest_first() {
        let (_, _, service) = setup();
        service.create("Alice", "Widget", 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newest = service.create("Bob", "Gadget", 2).await.unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newest.id);
    }

    #[tokio::test]
    async fn test_delete_returns_whether_order_existed() {
        let (_, _, service) = setup();
        let order = service.create("Alice", "Widget", 1).await.unwrap();

        assert!(service.delete(order.id).await.unwrap());
        assert!(!service.delete(order.id).await.unwrap());
        assert!(matches!(
            service.get(order.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
