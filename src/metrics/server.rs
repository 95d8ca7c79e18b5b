use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};

use super::Metrics;

/// Name reported by `GET /health`
#[derive(Debug, Clone, Copy)]
pub struct ServiceName(pub &'static str);

/// Mount `GET /metrics` and `GET /health`. Expects `web::Data<Metrics>` and
/// `web::Data<ServiceName>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

async fn health_handler(service: web::Data<ServiceName>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": service.0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_metrics_and_health_endpoints() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.orders_created.inc();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(metrics))
                .app_data(web::Data::new(ServiceName("order-service")))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("orders_created_total 1"));

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "order-service");
    }
}
