use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::catalog::ProductId;
use crate::domain::order::{OrderEvent, OrderItemEvent, OrderStatus};

// ============================================================================
// Analytics - star-schema read model
// ============================================================================
//
//   dim_customer (natural key: email)
//   dim_date     (natural key: calendar day, surrogate yyyymmdd)
//   dim_product  (natural key: product id)
//   fact_order_items (idempotency key: order id + product id)
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDimension {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductDimension {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub brand: String,
}

/// Calendar attributes stored alongside each date key
#[derive(Debug, Clone, PartialEq)]
pub struct DateDimension {
    pub date_key: i32,
    pub full_date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub day: i32,
    pub day_of_week: i32,
}

impl DateDimension {
    pub fn from_day(day: NaiveDate) -> Self {
        Self {
            date_key: date_key(day),
            full_date: day,
            year: day.year(),
            quarter: (day.month0() / 3 + 1) as i32,
            month: day.month() as i32,
            day: day.day() as i32,
            day_of_week: day.weekday().number_from_monday() as i32,
        }
    }
}

/// `2024-03-07` -> `20240307`
pub fn date_key(day: NaiveDate) -> i32 {
    day.year() * 10_000 + day.month() as i32 * 100 + day.day() as i32
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactOrderItem {
    pub order_id: Uuid,
    pub product_id: ProductId,
    pub customer_key: i64,
    pub date_key: i32,
    pub product_key: i64,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl CustomerDimension {
    pub fn from_event(event: &OrderEvent) -> Self {
        Self {
            email: event.customer_email.clone(),
            name: event.customer_name.clone(),
        }
    }
}

impl ProductDimension {
    pub fn from_item(item: &OrderItemEvent) -> Self {
        Self {
            product_id: item.product_id,
            name: item.product_name.clone(),
            category: item.category.clone(),
            brand: item.brand.clone(),
        }
    }
}

// ============================================================================
// Read side
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub order_day: NaiveDate,
    pub total_orders: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_order_value: Decimal,
    pub total_items: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_name: String,
    pub times_ordered: i64,
    pub total_units_sold: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub order_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub order_date: DateTime<Utc>,
    pub status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub item_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_key_is_yyyymmdd() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_key(day), 20240307);

        let day = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(date_key(day), 19991231);
    }

    #[test]
    fn test_date_dimension_attributes() {
        // 2024-11-15 is a Friday in Q4
        let dim = DateDimension::from_day(NaiveDate::from_ymd_opt(2024, 11, 15).unwrap());
        assert_eq!(dim.date_key, 20241115);
        assert_eq!(dim.quarter, 4);
        assert_eq!(dim.month, 11);
        assert_eq!(dim.day_of_week, 5);
    }
}
