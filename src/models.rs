use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub product_name: String,
    pub quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields for an order that has not been persisted yet.
/// The store assigns the id on insert.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_name: String,
    pub product_name: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied as a single atomic read-modify-write.
/// `None` means "leave the field unchanged".
#[derive(Clone, Debug, Default)]
pub struct OrderPatch {
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<i32>,
    pub status: Option<OrderStatus>,
    pub clear_processed_at: bool,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.product_name.is_none()
            && self.quantity.is_none()
            && self.status.is_none()
            && !self.clear_processed_at
    }
}

// ============================================================================
// Order Status
// ============================================================================
//
// NEW is the only state the processing worker acts on. PROCESSED,
// CANCELLED and ERROR_JMS are terminal for the worker until a caller
// resets the order to NEW, which re-enqueues it.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Processed,
    Cancelled,
    ErrorJms,
}

impl OrderStatus {
    /// Canonical storage/wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::ErrorJms => "ERROR_JMS",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    /// Case-insensitive parse; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "ERROR_JMS" => Ok(OrderStatus::ErrorJms),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
