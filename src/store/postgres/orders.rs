use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::store::{OrderStore, OutboxMessage, OutboxStore, StoreError};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_name: String,
    customer_email: String,
    order_date: DateTime<Utc>,
    status: String,
    total_amount: Decimal,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e: crate::domain::order::OrderError| StoreError::Corrupt(e.to_string()))?;

        Ok(Order {
            id: self.id,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            order_date: self.order_date,
            status,
            total_amount: self.total_amount,
            items,
        })
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

const ORDER_COLUMNS: &str = "id, customer_name, customer_email, order_date, status, total_amount";
const ITEM_COLUMNS: &str = "order_id, product_id, product_name, quantity, unit_price, line_total";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_status(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, line_no",
            ITEM_COLUMNS
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            items.entry(row.order_id).or_default().push(row.into());
        }
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, customer_name, customer_email, order_date, status, total_amount)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, line_no, product_id, product_name, quantity, unit_price, line_total)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::set_status(&mut tx, order_id, status).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn confirm_with_outbox(&self, order_id: Uuid, outbox: Option<OutboxMessage>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        Self::set_status(&mut tx, order_id, OrderStatus::Confirmed).await?;

        if let Some(message) = outbox {
            sqlx::query(
                "INSERT INTO outbox_messages (id, aggregate_id, event_type, topic, partition_key, payload, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(message.id)
            .bind(message.aggregate_id)
            .bind(&message.event_type)
            .bind(&message.topic)
            .bind(&message.partition_key)
            .bind(&message.payload)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.load_items(&[order_id]).await?;
        let order = row.into_order(items.remove(&order_id).unwrap_or_default())?;
        Ok(Some(order))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders ORDER BY order_date DESC, id DESC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut items = self.load_items(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for PgOrderStore {
    async fn fetch_pending(&self, limit: i64, lease: Duration) -> Result<Vec<OutboxMessage>, StoreError> {
        // SKIP LOCKED keeps two relays from claiming the same rows in the
        // same instant; claimed_until keeps them apart for the rest of the cycle.
        let mut messages: Vec<OutboxMessage> = sqlx::query_as(
            "UPDATE outbox_messages
             SET claimed_until = now() + make_interval(secs => $2)
             WHERE id IN (
                 SELECT id FROM outbox_messages
                 WHERE published_at IS NULL AND dead_lettered_at IS NULL
                   AND (claimed_until IS NULL OR claimed_until <= now())
                 ORDER BY created_at
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, aggregate_id, event_type, topic, partition_key, payload, created_at",
        )
        .bind(limit)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn release(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox_messages SET claimed_until = NULL WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_published(&self, id: Uuid, attempts: i32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox_messages SET published_at = now(), attempts = $2, claimed_until = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dead_lettered(&self, id: Uuid, attempts: i32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox_messages SET dead_lettered_at = now(), attempts = $2, claimed_until = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
