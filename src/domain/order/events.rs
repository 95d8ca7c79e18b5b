use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::ProductId;
use super::aggregate::{Order, PricedLine};
use super::value_objects::OrderStatus;

// ============================================================================
// OrderEvent - completion fact published on the bus
// ============================================================================
//
// A denormalized, immutable snapshot of a confirmed order. Consumers need
// nothing else to do their job: the analytics consumer reads category and
// brand from here instead of calling back into the catalog.
//
// Wire format (JSON, camelCase):
// {orderId, customerName, customerEmail, orderDate, status, totalAmount,
//  itemCount, items:[{productId, productName, category, brand, quantity,
//  unitPrice, lineTotal}]}
//
// ============================================================================

pub const ORDER_EVENTS_TOPIC: &str = "order-events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub item_count: usize,
    pub items: Vec<OrderItemEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemEvent {
    pub product_id: ProductId,
    pub product_name: String,
    pub category: String,
    pub brand: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

impl OrderEvent {
    /// Outbox `event_type` for completion events
    pub const EVENT_TYPE: &'static str = "OrderConfirmed";

    /// Snapshot `order` as priced from `lines`.
    pub fn snapshot(order: &Order, lines: &[PricedLine]) -> Self {
        let items = order
            .items
            .iter()
            .map(|item| {
                let product = lines
                    .iter()
                    .find(|line| line.product.id == item.product_id)
                    .map(|line| &line.product);
                OrderItemEvent {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    category: product.map(|p| p.category.clone()).unwrap_or_default(),
                    brand: product.map(|p| p.brand.clone()).unwrap_or_default(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                }
            })
            .collect();

        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            order_date: order.order_date,
            status: order.status,
            total_amount: order.total_amount,
            item_count: order.item_count(),
            items,
        }
    }

    /// Partition key: every message for one order lands on one partition
    pub fn key(&self) -> String {
        self.order_id.to_string()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Product;
    use crate::domain::order::value_objects::{OrderItemRequest, OrderRequest};

    fn priced(id: i64, cents: i64, quantity: i32) -> PricedLine {
        PricedLine {
            product: Product {
                id,
                name: format!("Product {}", id),
                category: "Electronics".to_string(),
                brand: "Acme".to_string(),
                price: Decimal::new(cents, 2),
                active: true,
            },
            quantity,
        }
    }

    fn confirmed_order(lines: &[PricedLine]) -> Order {
        let request = OrderRequest {
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            items: vec![OrderItemRequest { product_id: 1, quantity: 1 }],
        };
        let mut order = Order::pending(&request, lines);
        order.confirm().unwrap();
        order
    }

    #[test]
    fn test_snapshot_carries_catalog_attributes() {
        let lines = vec![priced(1, 1000, 2), priced(2, 2500, 1)];
        let order = confirmed_order(&lines);

        let event = OrderEvent::snapshot(&order, &lines);

        assert_eq!(event.item_count, 2);
        assert_eq!(event.total_amount, Decimal::new(4500, 2));
        assert_eq!(event.status, OrderStatus::Confirmed);
        assert_eq!(event.items[1].category, "Electronics");
        assert_eq!(event.items[1].brand, "Acme");
        assert_eq!(event.key(), order.id.to_string());
    }

    #[test]
    fn test_wire_field_names() {
        let lines = vec![priced(1, 1000, 2)];
        let event = OrderEvent::snapshot(&confirmed_order(&lines), &lines);

        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        for field in [
            "orderId",
            "customerName",
            "customerEmail",
            "orderDate",
            "status",
            "totalAmount",
            "itemCount",
            "items",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(value["status"], "CONFIRMED");
        assert_eq!(value["items"][0]["lineTotal"], 20.0);
        assert_eq!(value["items"][0]["unitPrice"], 10.0);
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert!(OrderEvent::decode("not json").is_err());
        assert!(OrderEvent::decode(r#"{"orderId":"x"}"#).is_err());
    }
}
