//! Order service HTTP API

use actix_web::{web, HttpResponse};
use kameo::actor::ActorRef;
use serde::Deserialize;
use uuid::Uuid;

use super::error::{self, ApiError, ApiResult};
use crate::actors::{DlqActor, GetDeadLetters};
use crate::domain::order::{OrderOrchestrator, OrderRequest};
use crate::domain::FailureKind;

#[derive(Debug, Deserialize)]
struct DeadLetterQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(error::json_config())
        .app_data(error::query_config())
        .app_data(error::path_config())
        .route("/orders", web::post().to(create_order))
        .route("/orders", web::get().to(list_orders))
        .route("/orders/{id}", web::get().to(get_order))
        .route("/dead-letters", web::get().to(list_dead_letters));
}

async fn create_order(
    orders: web::Data<OrderOrchestrator>,
    request: web::Json<OrderRequest>,
) -> ApiResult<HttpResponse> {
    let order = orders.create_order(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(order))
}

async fn list_orders(orders: web::Data<OrderOrchestrator>) -> ApiResult<HttpResponse> {
    let orders = orders.list_orders().await?;
    Ok(HttpResponse::Ok().json(orders))
}

async fn get_order(orders: web::Data<OrderOrchestrator>, id: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let order = orders.get_order(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Dead-lettered outbox messages, newest failure first
async fn list_dead_letters(
    dlq: web::Data<ActorRef<DlqActor>>,
    query: web::Query<DeadLetterQuery>,
) -> ApiResult<HttpResponse> {
    let letters = dlq
        .ask(GetDeadLetters {
            limit: query.limit.clamp(1, 500),
        })
        .await
        .map_err(|e| ApiError::new(FailureKind::Internal, e.to_string()))?;

    Ok(HttpResponse::Ok().json(letters))
}
