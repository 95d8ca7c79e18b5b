use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::ledger::Account;
use crate::store::{AccountStore, DebitOutcome, StoreError};

#[derive(sqlx::FromRow)]
struct AccountRow {
    customer_email: String,
    customer_name: String,
    balance: Decimal,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            customer_email: row.customer_email,
            customer_name: row.customer_name,
            balance: row.balance,
        }
    }
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            "SELECT customer_email, customer_name, balance FROM accounts ORDER BY customer_email",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT customer_email, customer_name, balance FROM accounts WHERE customer_email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock first: a concurrent debit on this account waits here, and
        // once it commits its ledger entry is visible to the check below.
        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT balance FROM accounts WHERE customer_email = $1 FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            return Ok(DebitOutcome::AccountMissing);
        };

        let replayed: Option<(String, Decimal, Decimal)> = sqlx::query_as(
            "SELECT customer_email, amount, balance_after FROM ledger_entries WHERE reference_id = $1",
        )
        .bind(reference_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((entry_email, entry_amount, new_balance)) = replayed {
            if entry_email != email || entry_amount != amount {
                return Ok(DebitOutcome::ReferenceConflict);
            }
            return Ok(DebitOutcome::Replayed { new_balance });
        }

        if balance < amount {
            return Ok(DebitOutcome::Insufficient { available: balance });
        }

        let new_balance: Decimal = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance - $1 WHERE customer_email = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ledger_entries (reference_id, customer_email, amount, balance_after)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(reference_id)
        .bind(email)
        .bind(amount)
        .bind(new_balance)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DebitOutcome::Applied { new_balance })
    }
}
