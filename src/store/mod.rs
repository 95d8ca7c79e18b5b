// ============================================================================
// Store - persistence ports
// ============================================================================
//
// Every collaborator the domain needs from a database is a trait here, with
// two implementations:
// - postgres/ : sqlx against Postgres (production)
// - memory    : mutex-guarded maps (tests, standalone mode)
//
// Both implementations must uphold the same atomicity rules:
// - `AccountStore::debit` is serialized per account and never drives a
//   balance negative
// - `OrderStore::confirm_with_outbox` writes the status change and the outbox
//   row together or not at all
// - `Warehouse` upserts are idempotent on their natural keys
//
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::analytics::{
    CustomerDimension, DailySummary, FactOrderItem, ProductDimension, RecentOrder, TopProduct,
};
use crate::domain::catalog::{Product, ProductId};
use crate::domain::ledger::Account;
use crate::domain::order::{Order, OrderStatus};
use crate::utils::IsTransient;

pub use memory::{InMemoryAccountStore, InMemoryCatalog, InMemoryDeadLetterStore, InMemoryOrderStore, InMemoryWarehouse};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                // serialization_failure, deadlock_detected
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::NotFound(_) | StoreError::Corrupt(_) => false,
        }
    }
}

// ============================================================================
// Records shared by several stores
// ============================================================================

/// An event waiting in the transactional outbox.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub partition_key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// A message that could not be delivered within its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

/// Result of an atomic debit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    Applied { new_balance: Decimal },
    /// A debit with the same reference was already applied; nothing changed.
    Replayed { new_balance: Decimal },
    Insufficient { available: Decimal },
    AccountMissing,
    /// The reference already settled a debit with a different email or amount.
    ReferenceConflict,
}

// ============================================================================
// Ports
// ============================================================================

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Debit `amount` from the account, serialized against concurrent debits
    /// on the same account. `reference_id` makes the call idempotent.
    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitOutcome, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), StoreError>;

    /// Mark the order CONFIRMED and enqueue its event in one transaction.
    async fn confirm_with_outbox(&self, order_id: Uuid, outbox: Option<OutboxMessage>) -> Result<(), StoreError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `limit` unpublished messages, oldest first. A claimed
    /// message is skipped by every other caller until it is marked, released,
    /// or `lease` runs out, so concurrent relays never publish the same row.
    async fn fetch_pending(&self, limit: i64, lease: Duration) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Hand claimed messages back for the next cycle
    async fn release(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    async fn mark_published(&self, id: Uuid, attempts: i32) -> Result<(), StoreError>;

    /// Take the message out of rotation after it was dead-lettered
    async fn mark_dead_lettered(&self, id: Uuid, attempts: i32) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn add(&self, letter: DeadLetter) -> Result<(), StoreError>;

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError>;
}

/// Dimensional read model written by the analytics consumer.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Insert or update by email; returns the surrogate key
    async fn upsert_customer(&self, customer: &CustomerDimension) -> Result<i64, StoreError>;

    /// Insert if missing; returns the `yyyymmdd` date key
    async fn upsert_date(&self, day: NaiveDate) -> Result<i32, StoreError>;

    /// Insert or update by product id; returns the surrogate key
    async fn upsert_product(&self, product: &ProductDimension) -> Result<i64, StoreError>;

    /// Insert-or-ignore on (order_id, product_id); true if a row was written
    async fn insert_fact(&self, fact: &FactOrderItem) -> Result<bool, StoreError>;

    async fn daily_summary(&self) -> Result<Vec<DailySummary>, StoreError>;

    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, StoreError>;

    async fn recent_orders(&self, limit: i64) -> Result<Vec<RecentOrder>, StoreError>;
}
