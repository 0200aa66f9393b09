use crate::models::OrderStatus;
use crate::utils::IsTransient;
use uuid::Uuid;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Validation and not-found failures are recovered at the service boundary
// and surfaced to the caller as explicit results. Infrastructure failures
// carry enough context to decide between retry (transient) and giving up
// (permanent).
//
// ============================================================================

/// Failures surfaced by the order lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input to create/update. Rendered as 400 by the request layer.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced order does not exist. Rendered as 404.
    #[error("order {0} not found")]
    NotFound(Uuid),

    /// Store unavailable or query failure. Rendered as 500.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures from the order store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached. Safe to retry idempotent operations.
    #[error("order store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the statement. Retrying will not help.
    #[error("order store query failed: {0}")]
    Query(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Failures from the order queue producer.
#[derive(Debug, thiserror::Error)]
#[error("order queue publish failed: {0}")]
pub struct QueueError(pub String);

/// Outcome of a single delivered queue message.
///
/// Everything except `Processed` is a discard: the message is consumed
/// without mutating the order. Discards are expected under at-least-once
/// delivery and are not infrastructure failures.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The order transitioned NEW -> PROCESSED.
    Processed(Uuid),

    /// Payload was not a valid order id. Poison message, never retried.
    Malformed,

    /// The order was deleted (or never existed) before consumption.
    Missing(Uuid),

    /// The order is no longer NEW; duplicate or stale delivery.
    Stale(Uuid, OrderStatus),

    /// The order left NEW between the load and the conditional commit.
    Lost(Uuid),
}

impl MessageOutcome {
    /// Label used for the discard-reason metric.
    pub fn reason(&self) -> &'static str {
        match self {
            MessageOutcome::Processed(_) => "processed",
            MessageOutcome::Malformed => "malformed",
            MessageOutcome::Missing(_) => "missing",
            MessageOutcome::Stale(_, _) => "stale",
            MessageOutcome::Lost(_) => "lost",
        }
    }
}
