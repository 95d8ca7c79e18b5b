use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::{AccountStore, DebitOutcome};
use super::errors::LedgerError;
use super::value_objects::{Account, BalanceCheck, DebitReceipt};

// ============================================================================
// Ledger Service
// ============================================================================
//
// Owns account balances. Debit serialization is delegated to the
// `AccountStore`, which locks the account row (Postgres: SELECT ... FOR
// UPDATE under READ COMMITTED; memory: one mutex over the whole book) for the whole
// read-check-write sequence.
//
// ============================================================================

pub struct LedgerService {
    accounts: Arc<dyn AccountStore>,
    metrics: Arc<Metrics>,
}

impl LedgerService {
    pub fn new(accounts: Arc<dyn AccountStore>, metrics: Arc<Metrics>) -> Self {
        Self { accounts, metrics }
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.accounts.list_accounts().await?)
    }

    pub async fn get_account(&self, email: &str) -> Result<Account, LedgerError> {
        self.accounts
            .find_account(email)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(email.to_string()))
    }

    /// Read-only: reports whether `amount` could be debited right now.
    pub async fn check_balance(&self, email: &str, amount: Decimal) -> Result<BalanceCheck, LedgerError> {
        let started = Instant::now();
        let result = self.check_balance_inner(email, amount).await;
        self.record("check_balance", started, &result);
        result
    }

    async fn check_balance_inner(&self, email: &str, amount: Decimal) -> Result<BalanceCheck, LedgerError> {
        ensure_positive(amount)?;
        let account = self.get_account(email).await?;

        Ok(BalanceCheck {
            email: account.customer_email,
            customer_name: account.customer_name,
            sufficient: account.balance >= amount,
            balance: account.balance,
        })
    }

    /// Debit `amount` for order `reference_id`. Replaying the same reference
    /// returns the original receipt without touching the balance; reusing it
    /// for another account or amount is a `ReferenceConflict`.
    pub async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitReceipt, LedgerError> {
        let started = Instant::now();
        let result = self.debit_inner(email, amount, reference_id).await;
        self.record("debit", started, &result);
        result
    }

    async fn debit_inner(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitReceipt, LedgerError> {
        ensure_positive(amount)?;

        let new_balance = match self.accounts.debit(email, amount, reference_id).await? {
            DebitOutcome::Applied { new_balance } => {
                tracing::info!(
                    email = %email,
                    amount = %amount,
                    order_id = %reference_id,
                    new_balance = %new_balance,
                    "Account debited"
                );
                new_balance
            }
            DebitOutcome::Replayed { new_balance } => {
                tracing::info!(
                    email = %email,
                    order_id = %reference_id,
                    "Debit already applied for this order, returning original receipt"
                );
                new_balance
            }
            DebitOutcome::Insufficient { available } => {
                tracing::warn!(
                    email = %email,
                    available = %available,
                    required = %amount,
                    "Debit rejected: insufficient balance"
                );
                return Err(LedgerError::InsufficientBalance {
                    email: email.to_string(),
                    required: amount,
                });
            }
            DebitOutcome::AccountMissing => return Err(LedgerError::AccountNotFound(email.to_string())),
            DebitOutcome::ReferenceConflict => {
                tracing::warn!(
                    email = %email,
                    amount = %amount,
                    order_id = %reference_id,
                    "Debit rejected: reference already settled a different debit"
                );
                return Err(LedgerError::ReferenceConflict { reference_id });
            }
        };

        Ok(DebitReceipt {
            email: email.to_string(),
            new_balance,
            order_id: reference_id,
            success: true,
        })
    }

    fn record<T>(&self, operation: &str, started: Instant, result: &Result<T, LedgerError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind().code(),
        };
        self.metrics
            .record_ledger_call(operation, started.elapsed().as_secs_f64(), outcome);
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}
