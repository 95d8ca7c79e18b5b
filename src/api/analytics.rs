//! Analytics read API over the star schema

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use super::error::{self, ApiResult};
use crate::store::Warehouse;

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

impl LimitQuery {
    fn or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 1000)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(error::query_config()).service(
        web::scope("/analytics")
            .route("/daily-summary", web::get().to(daily_summary))
            .route("/top-products", web::get().to(top_products))
            .route("/recent-orders", web::get().to(recent_orders)),
    );
}

async fn daily_summary(warehouse: web::Data<Arc<dyn Warehouse>>) -> ApiResult<HttpResponse> {
    let summary = warehouse.daily_summary().await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn top_products(
    warehouse: web::Data<Arc<dyn Warehouse>>,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let products = warehouse.top_products(query.or(10)).await?;
    Ok(HttpResponse::Ok().json(products))
}

async fn recent_orders(
    warehouse: web::Data<Arc<dyn Warehouse>>,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let orders = warehouse.recent_orders(query.or(20)).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analytics::{CustomerDimension, FactOrderItem, ProductDimension};
    use crate::domain::order::OrderStatus;
    use crate::store::InMemoryWarehouse;
    use actix_web::{test, App};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn seeded() -> Arc<dyn Warehouse> {
        let warehouse: Arc<dyn Warehouse> = Arc::new(InMemoryWarehouse::new());
        let order_date = Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap();

        let customer_key = warehouse
            .upsert_customer(&CustomerDimension {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
            })
            .await
            .unwrap();
        let date_key = warehouse.upsert_date(order_date.date_naive()).await.unwrap();

        for (product_id, name, cents, quantity) in [(1, "Mouse", 2000, 2), (2, "Monitor", 30000, 1)] {
            let product_key = warehouse
                .upsert_product(&ProductDimension {
                    product_id,
                    name: name.to_string(),
                    category: "Peripherals".to_string(),
                    brand: "Acme".to_string(),
                })
                .await
                .unwrap();
            let unit_price = Decimal::new(cents, 2);
            warehouse
                .insert_fact(&FactOrderItem {
                    order_id: Uuid::now_v7(),
                    product_id,
                    customer_key,
                    date_key,
                    product_key,
                    order_date,
                    status: OrderStatus::Confirmed,
                    quantity,
                    unit_price,
                    line_total: unit_price * Decimal::from(quantity),
                })
                .await
                .unwrap();
        }

        warehouse
    }

    #[actix_web::test]
    async fn test_top_products_ranked_by_revenue() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/analytics/top-products?limit=1").to_request();
        let products: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;

        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["productName"], "Monitor");
        assert_eq!(products[0]["totalRevenue"], 300.0);
    }

    #[actix_web::test]
    async fn test_daily_summary_and_recent_orders() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/analytics/daily-summary").to_request();
        let summary: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0]["orderDay"], "2024-11-15");
        assert_eq!(summary[0]["totalOrders"], 2);
        assert_eq!(summary[0]["totalItems"], 3);

        let req = test::TestRequest::get().uri("/analytics/recent-orders").to_request();
        let orders: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0]["status"], "CONFIRMED");
    }
}
