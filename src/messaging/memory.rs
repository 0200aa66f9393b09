use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::messaging::OrderQueue;

// ============================================================================
// In-Memory Order Queue
// ============================================================================
//
// Captures published payloads so tests can assert on enqueue side effects
// and replay them through the worker by hand. Can be switched into a
// failing mode to exercise the enqueue-failure path.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryOrderQueue {
    published: Mutex<Vec<String>>,
    fail_publish: Mutex<bool>,
}

impl MemoryOrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All payloads published so far, oldest first.
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    /// Remove and return all pending payloads.
    pub fn drain(&self) -> Vec<String> {
        self.published.lock().unwrap().drain(..).collect()
    }

    /// Make subsequent publishes fail, simulating an unavailable broker.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_publish.lock().unwrap() = failing;
    }
}

#[async_trait]
impl OrderQueue for MemoryOrderQueue {
    async fn publish(&self, order_id: Uuid) -> Result<(), QueueError> {
        if *self.fail_publish.lock().unwrap() {
            return Err(QueueError("broker unavailable".to_string()));
        }

        self.published.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}
