use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::FailureKind;
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Ledger Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account not found for email: {0}")]
    AccountNotFound(String),

    #[error("Insufficient balance for {email}. Required: ${required:.2}")]
    InsufficientBalance { email: String, required: Decimal },

    /// The order id already settled a debit on another account or for
    /// another amount.
    #[error("Reference {reference_id} was already used for a different debit")]
    ReferenceConflict { reference_id: Uuid },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected ledger response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LedgerError::AccountNotFound(_) => FailureKind::AccountNotFound,
            LedgerError::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            LedgerError::ReferenceConflict { .. } => FailureKind::DuplicateReference,
            LedgerError::InvalidAmount(_) => FailureKind::Validation,
            LedgerError::Unavailable(_) => FailureKind::DownstreamUnavailable,
            LedgerError::Protocol(_) => FailureKind::Serialization,
            LedgerError::Store(e) if e.is_transient() => FailureKind::DownstreamUnavailable,
            LedgerError::Store(_) => FailureKind::Internal,
        }
    }
}

impl IsTransient for LedgerError {
    fn is_transient(&self) -> bool {
        match self {
            LedgerError::Unavailable(_) => true,
            LedgerError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
