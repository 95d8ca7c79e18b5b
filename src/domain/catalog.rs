use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type ProductId = i64;

/// Product reference data. The orchestrator reads it to price orders; it is
/// never modified by the order lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub brand: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub active: bool,
}

impl Product {
    /// Only active products can be ordered
    pub fn is_orderable(&self) -> bool {
        self.active
    }
}
