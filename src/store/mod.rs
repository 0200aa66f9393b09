mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use crate::error::StoreError;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Order Store Contract
// ============================================================================
//
// The store is the single source of truth. Every mutation is an atomic
// read-modify-write keyed by id; conflicting writes to the same order are
// serialized by the store itself, never by locks held in this process.
//
// ============================================================================

/// Result of the conditional NEW -> PROCESSED commit.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The order was still NEW and is now PROCESSED.
    Updated(Order),
    /// The order exists but left NEW concurrently; no mutation happened.
    Conflict(OrderStatus),
    /// The order no longer exists.
    NotFound,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order with status NEW and return it with its
    /// store-generated id. The insert is durable before this returns.
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Apply a partial update as one atomic write. Returns the updated
    /// order, or `None` if the id does not exist.
    async fn apply_patch(&self, id: Uuid, patch: OrderPatch)
        -> Result<Option<Order>, StoreError>;

    /// Set status PROCESSED and `processed_at`, but only if the current
    /// status is still NEW (re-check-and-set, not a blind overwrite).
    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Remove the order; returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All orders, newest first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;
}
