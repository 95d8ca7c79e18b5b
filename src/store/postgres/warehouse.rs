use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::domain::analytics::{
    CustomerDimension, DailySummary, DateDimension, FactOrderItem, ProductDimension, RecentOrder, TopProduct,
};
use crate::store::{StoreError, Warehouse};

/// Star schema in Postgres. Every write is idempotent on its natural key, so
/// a redelivered event rewrites the same rows.
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn upsert_customer(&self, customer: &CustomerDimension) -> Result<i64, StoreError> {
        let key: i64 = sqlx::query_scalar(
            "INSERT INTO dim_customer (email, name) VALUES ($1, $2)
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, updated_at = now()
             RETURNING customer_key",
        )
        .bind(&customer.email)
        .bind(&customer.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn upsert_date(&self, day: NaiveDate) -> Result<i32, StoreError> {
        let dim = DateDimension::from_day(day);

        sqlx::query(
            "INSERT INTO dim_date (date_key, full_date, year, quarter, month, day, day_of_week)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (date_key) DO NOTHING",
        )
        .bind(dim.date_key)
        .bind(dim.full_date)
        .bind(dim.year)
        .bind(dim.quarter)
        .bind(dim.month)
        .bind(dim.day)
        .bind(dim.day_of_week)
        .execute(&self.pool)
        .await?;

        Ok(dim.date_key)
    }

    async fn upsert_product(&self, product: &ProductDimension) -> Result<i64, StoreError> {
        let key: i64 = sqlx::query_scalar(
            "INSERT INTO dim_product (product_id, name, category, brand) VALUES ($1, $2, $3, $4)
             ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                brand = EXCLUDED.brand,
                updated_at = now()
             RETURNING product_key",
        )
        .bind(product.product_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.brand)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn insert_fact(&self, fact: &FactOrderItem) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO fact_order_items (
                order_id, product_id, customer_key, date_key, product_key,
                order_date, status, quantity, unit_price, line_total
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (order_id, product_id) DO NOTHING",
        )
        .bind(fact.order_id)
        .bind(fact.product_id)
        .bind(fact.customer_key)
        .bind(fact.date_key)
        .bind(fact.product_key)
        .bind(fact.order_date)
        .bind(fact.status.as_str())
        .bind(fact.quantity)
        .bind(fact.unit_price)
        .bind(fact.line_total)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn daily_summary(&self) -> Result<Vec<DailySummary>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT d.full_date AS order_day,
                    COUNT(DISTINCT f.order_id) AS total_orders,
                    SUM(f.line_total) AS total_revenue,
                    ROUND(SUM(f.line_total) / COUNT(DISTINCT f.order_id), 2) AS avg_order_value,
                    SUM(f.quantity)::BIGINT AS total_items
             FROM fact_order_items f
             JOIN dim_date d ON d.date_key = f.date_key
             GROUP BY d.full_date
             ORDER BY d.full_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT p.name AS product_name,
                    COUNT(DISTINCT f.order_id) AS times_ordered,
                    SUM(f.quantity)::BIGINT AS total_units_sold,
                    SUM(f.line_total) AS total_revenue,
                    ROUND(AVG(f.unit_price), 2) AS avg_unit_price
             FROM fact_order_items f
             JOIN dim_product p ON p.product_key = f.product_key
             GROUP BY p.product_key, p.name
             ORDER BY total_revenue DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<RecentOrder>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT f.order_id,
                    c.name AS customer_name,
                    c.email AS customer_email,
                    MAX(f.order_date) AS order_date,
                    MAX(f.status) AS status,
                    SUM(f.line_total) AS total_amount,
                    COUNT(*) AS item_count
             FROM fact_order_items f
             JOIN dim_customer c ON c.customer_key = f.customer_key
             GROUP BY f.order_id, c.name, c.email
             ORDER BY order_date DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
