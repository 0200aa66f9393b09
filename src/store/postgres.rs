use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::store::{OrderStore, UpdateOutcome};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// All mutations are single-statement conditional writes, so row-level
// locking in Postgres serializes concurrent updates to the same order
// without any locking in this process.
//
// ============================================================================

pub struct PgOrderStore {
    pool: PgPool,
}

const SELECT_COLUMNS: &str =
    "id, customer_name, product_name, quantity, status, created_at, processed_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_name: String,
    product_name: String,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|_| StoreError::Query(format!("corrupt status value: {}", row.status)))?;

        Ok(Order {
            id: row.id,
            customer_name: row.customer_name,
            product_name: row.product_name,
            quantity: row.quantity,
            status,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the orders table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                customer_name TEXT NOT NULL,
                product_name TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let id = Uuid::new_v4();

        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (id, customer_name, product_name, quantity, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id)
        .bind(&order.customer_name)
        .bind(&order.product_name)
        .bind(order.quantity)
        .bind(OrderStatus::New.as_str())
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Order::try_from).transpose()
    }

    async fn apply_patch(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<Order>, StoreError> {
        // One UPDATE statement keeps the read-modify-write atomic.
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET
                customer_name = COALESCE($2, customer_name),
                product_name = COALESCE($3, product_name),
                quantity = COALESCE($4, quantity),
                status = COALESCE($5, status),
                processed_at = CASE WHEN $6 THEN NULL ELSE processed_at END
             WHERE id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.customer_name)
        .bind(patch.product_name)
        .bind(patch.quantity)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.clear_processed_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET status = $2, processed_at = $3
             WHERE id = $1 AND status = $4
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id)
        .bind(OrderStatus::Processed.as_str())
        .bind(processed_at)
        .bind(OrderStatus::New.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(UpdateOutcome::Updated(row.try_into()?));
        }

        // Distinguish "gone" from "no longer NEW" for logging/metrics.
        match self.find_by_id(id).await? {
            Some(order) => Ok(UpdateOutcome::Conflict(order.status)),
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
