// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - catalog:   read-only product reference data
// - ledger:    account balances, balance checks, debits
// - order:     order pricing, the fulfillment saga, the OrderEvent snapshot
// - analytics: star-schema read model fed by OrderEvents
//
// Persistence lives behind the traits in `crate::store`; this layer never
// touches a database or a broker directly.
//
// ============================================================================

pub mod analytics;
pub mod catalog;
pub mod ledger;
pub mod order;

use serde::Serialize;

/// Failure classes surfaced across service boundaries.
///
/// Every domain error maps onto exactly one kind; the HTTP layer turns the
/// kind into a status code and the metrics layer uses `code()` as a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Validation,
    ProductNotFound,
    AccountNotFound,
    OrderNotFound,
    InsufficientBalance,
    DuplicateReference,
    DownstreamUnavailable,
    Serialization,
    Internal,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Validation => "VALIDATION_ERROR",
            FailureKind::ProductNotFound => "PRODUCT_NOT_FOUND",
            FailureKind::AccountNotFound => "ACCOUNT_NOT_FOUND",
            FailureKind::OrderNotFound => "ORDER_NOT_FOUND",
            FailureKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            FailureKind::DuplicateReference => "DUPLICATE_REFERENCE",
            FailureKind::DownstreamUnavailable => "DOWNSTREAM_UNAVAILABLE",
            FailureKind::Serialization => "SERIALIZATION_FAILURE",
            FailureKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        [
            FailureKind::Validation,
            FailureKind::ProductNotFound,
            FailureKind::AccountNotFound,
            FailureKind::OrderNotFound,
            FailureKind::InsufficientBalance,
            FailureKind::DuplicateReference,
            FailureKind::DownstreamUnavailable,
            FailureKind::Serialization,
            FailureKind::Internal,
        ]
        .into_iter()
        .find(|kind| kind.code() == code)
    }
}
