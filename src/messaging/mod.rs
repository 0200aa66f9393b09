mod kafka;
mod memory;

pub use kafka::KafkaOrderQueue;
pub use memory::MemoryOrderQueue;

use crate::error::QueueError;
use async_trait::async_trait;
use uuid::Uuid;

// ============================================================================
// Order Queue Contract
// ============================================================================
//
// Durable at-least-once channel. The payload is the order id in its
// canonical string form, never an order snapshot: the worker re-reads
// current state at consumption time, so delivery order between messages
// does not matter.
//
// ============================================================================

#[async_trait]
pub trait OrderQueue: Send + Sync {
    /// Enqueue a processing trigger for the given order.
    async fn publish(&self, order_id: Uuid) -> Result<(), QueueError>;
}
