use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::Product;
use super::errors::OrderError;
use super::value_objects::{OrderItem, OrderRequest, OrderStatus};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// Invariants held by construction:
// - line_total == unit_price * quantity for every item
// - total_amount == sum of line totals
// - status only moves forward out of PENDING_DEBIT
//
// ============================================================================

/// A requested quantity resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product: Product,
    pub quantity: i32,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Price a validated request. The order starts in `PENDING_DEBIT`.
    pub fn pending(request: &OrderRequest, lines: &[PricedLine]) -> Self {
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem {
                product_id: line.product.id,
                product_name: line.product.name.clone(),
                quantity: line.quantity,
                unit_price: line.product.price,
                line_total: line.line_total(),
            })
            .collect();

        let total_amount = items.iter().map(|item| item.line_total).sum();

        Self {
            id: Uuid::now_v7(),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            order_date: Utc::now(),
            status: OrderStatus::PendingDebit,
            total_amount,
            items,
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Confirmed)
    }

    /// Compensating transition after a failed debit
    pub fn fail_debit(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::DebitFailedCompensating)
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        if self.status != OrderStatus::PendingDebit {
            return Err(OrderError::InvalidStatusTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::OrderItemRequest;
    use proptest::prelude::*;

    fn product(id: i64, price: Decimal) -> Product {
        Product {
            id,
            name: format!("Product {}", id),
            category: "Category".to_string(),
            brand: "Brand".to_string(),
            price,
            active: true,
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            items: vec![OrderItemRequest { product_id: 1, quantity: 1 }],
        }
    }

    #[test]
    fn test_two_item_order_totals_45() {
        let lines = vec![
            PricedLine { product: product(1, Decimal::new(1000, 2)), quantity: 2 },
            PricedLine { product: product(2, Decimal::new(2500, 2)), quantity: 1 },
        ];

        let order = Order::pending(&request(), &lines);

        assert_eq!(order.total_amount, Decimal::new(4500, 2));
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.items[0].line_total, Decimal::new(2000, 2));
        assert_eq!(order.status, OrderStatus::PendingDebit);
    }

    #[test]
    fn test_status_moves_forward_once() {
        let lines = vec![PricedLine { product: product(1, Decimal::ONE), quantity: 1 }];

        let mut order = Order::pending(&request(), &lines);
        order.confirm().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let err = order.fail_debit().unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStatusTransition {
                from: OrderStatus::Confirmed,
                to: OrderStatus::DebitFailedCompensating
            }
        ));
    }

    #[test]
    fn test_order_view_serializes_status_and_amounts() {
        let lines = vec![PricedLine { product: product(1, Decimal::new(2050, 2)), quantity: 2 }];
        let order = Order::pending(&request(), &lines);

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["status"], "PENDING_DEBIT");
        assert_eq!(value["totalAmount"], 41.0);
        assert_eq!(value["items"][0]["productName"], "Product 1");
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_of_line_totals(
            lines in prop::collection::vec((1i64..10_000_000, 1i32..1_000), 1..20)
        ) {
            let priced: Vec<PricedLine> = lines
                .iter()
                .enumerate()
                .map(|(i, (cents, qty))| PricedLine {
                    product: product(i as i64 + 1, Decimal::new(*cents, 2)),
                    quantity: *qty,
                })
                .collect();

            let order = Order::pending(&request(), &priced);

            let mut expected = Decimal::ZERO;
            for item in &order.items {
                prop_assert_eq!(item.line_total, item.unit_price * Decimal::from(item.quantity));
                expected += item.line_total;
            }
            prop_assert_eq!(order.total_amount, expected);
            prop_assert_eq!(order.items.len(), priced.len());
        }
    }
}
