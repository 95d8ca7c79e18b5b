use uuid::Uuid;

use crate::domain::catalog::ProductId;
use crate::domain::ledger::LedgerError;
use crate::domain::FailureKind;
use crate::store::StoreError;
use crate::utils::IsTransient;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid order request: {0}")]
    Validation(String),

    #[error("Product not found with id: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found with id: {0}")]
    OrderNotFound(Uuid),

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OrderError::Validation(_) => FailureKind::Validation,
            OrderError::ProductNotFound(_) => FailureKind::ProductNotFound,
            OrderError::OrderNotFound(_) => FailureKind::OrderNotFound,
            OrderError::InvalidStatusTransition { .. } | OrderError::UnknownStatus(_) => FailureKind::Internal,
            OrderError::Ledger(e) => e.kind(),
            OrderError::Store(e) if e.is_transient() => FailureKind::DownstreamUnavailable,
            OrderError::Store(_) => FailureKind::Internal,
        }
    }
}
