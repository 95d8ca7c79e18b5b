use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::catalog::ProductId;
use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Saga position of an order.
///
/// `PENDING_DEBIT -> CONFIRMED` on a successful debit,
/// `PENDING_DEBIT -> DEBIT_FAILED_COMPENSATING` when the debit fails after the
/// order was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingDebit,
    Confirmed,
    DebitFailedCompensating,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingDebit => "PENDING_DEBIT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::DebitFailedCompensating => "DEBIT_FAILED_COMPENSATING",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_DEBIT" => Ok(OrderStatus::PendingDebit),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "DEBIT_FAILED_COMPENSATING" => Ok(OrderStatus::DebitFailedCompensating),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Body of `POST /orders`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl OrderRequest {
    /// Shape checks that need no external call. Returns the request with
    /// trimmed customer fields and repeated product ids folded into one line.
    pub fn validated(self) -> Result<OrderRequest, OrderError> {
        let customer_name = self.customer_name.trim().to_string();
        let customer_email = self.customer_email.trim().to_string();

        if customer_name.is_empty() {
            return Err(OrderError::Validation("customerName must not be blank".to_string()));
        }
        if customer_email.is_empty() || !customer_email.contains('@') {
            return Err(OrderError::Validation(format!(
                "customerEmail is not a valid address: '{}'",
                customer_email
            )));
        }
        if self.items.is_empty() {
            return Err(OrderError::Validation("items must not be empty".to_string()));
        }

        let mut items: Vec<OrderItemRequest> = Vec::with_capacity(self.items.len());
        for item in self.items {
            if item.quantity <= 0 {
                return Err(OrderError::Validation(format!(
                    "quantity for product {} must be positive, got {}",
                    item.product_id, item.quantity
                )));
            }
            match items.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(item.quantity).ok_or_else(|| {
                        OrderError::Validation(format!("quantity for product {} overflows", item.product_id))
                    })?
                }
                None => items.push(item),
            }
        }

        Ok(OrderRequest {
            customer_name,
            customer_email,
            items,
        })
    }
}

/// A priced line of a persisted order. Name and price are snapshots taken
/// when the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}
