use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::store::{OrderStore, UpdateOutcome};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Backs the test suite and local runs without a database. The single
// mutex gives the same guarantee Postgres gives per row: each mutation
// is one atomic read-modify-write.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let order = Order {
            id: Uuid::new_v4(),
            customer_name: order.customer_name,
            product_name: order.product_name,
            quantity: order.quantity,
            status: OrderStatus::New,
            created_at: order.created_at,
            processed_at: None,
        };

        self.orders.lock().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn apply_patch(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.lock().await;

        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(customer_name) = patch.customer_name {
            order.customer_name = customer_name;
        }
        if let Some(product_name) = patch.product_name {
            order.product_name = product_name;
        }
        if let Some(quantity) = patch.quantity {
            order.quantity = quantity;
        }
        if let Some(status) = patch.status {
            order.status = status;
        }
        if patch.clear_processed_at {
            order.processed_at = None;
        }

        Ok(Some(order.clone()))
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut orders = self.orders.lock().await;

        match orders.get_mut(&id) {
            None => Ok(UpdateOutcome::NotFound),
            Some(order) if order.status != OrderStatus::New => {
                Ok(UpdateOutcome::Conflict(order.status))
            }
            Some(order) => {
                order.status = OrderStatus::Processed;
                order.processed_at = Some(processed_at);
                Ok(UpdateOutcome::Updated(order.clone()))
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.orders.lock().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.orders.lock().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(customer: &str) -> NewOrder {
        NewOrder {
            customer_name: customer.to_string(),
            product_name: "Widget".to_string(),
            quantity: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() {
        let store = MemoryOrderStore::new();
        let a = store.insert(new_order("a")).await.unwrap();
        let b = store.insert(new_order("b")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, OrderStatus::New);
        assert!(a.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_processed_requires_new_status() {
        let store = MemoryOrderStore::new();
        let order = store.insert(new_order("a")).await.unwrap();

        let outcome = store.mark_processed(order.id, Utc::now()).await.unwrap();
        let UpdateOutcome::Updated(updated) = outcome else {
            panic!("expected successful commit");
        };
        assert_eq!(updated.status, OrderStatus::Processed);
        assert!(updated.processed_at.is_some());

        // Second attempt hits the status guard.
        let outcome = store.mark_processed(order.id, Utc::now()).await.unwrap();
        assert!(matches!(
            outcome,
            UpdateOutcome::Conflict(OrderStatus::Processed)
        ));
    }

    #[tokio::test]
    async fn test_mark_processed_on_missing_order() {
        let store = MemoryOrderStore::new();
        let outcome = store.mark_processed(Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_patch_missing_order_returns_none() {
        let store = MemoryOrderStore::new();
        let patched = store
            .apply_patch(Uuid::new_v4(), OrderPatch::default())
            .await
            .unwrap();
        assert!(patched.is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = MemoryOrderStore::new();

        let older = NewOrder {
            created_at: Utc::now() - chrono::Duration::seconds(60),
            ..new_order("old")
        };
        store.insert(older).await.unwrap();
        let newest = store.insert(new_order("new")).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newest.id);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryOrderStore::new();
        let order = store.insert(new_order("a")).await.unwrap();

        assert!(store.delete(order.id).await.unwrap());
        assert!(!store.delete(order.id).await.unwrap());
        assert!(store.find_by_id(order.id).await.unwrap().is_none());
    }
}
