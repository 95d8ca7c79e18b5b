//! Ledger HTTP API

use actix_web::{web, HttpResponse};

use super::error::{self, ApiResult};
use crate::domain::ledger::{BalanceQuery, DebitRequest, LedgerService};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(error::json_config())
        .app_data(error::query_config())
        .route("/accounts", web::get().to(list_accounts))
        .route("/accounts/{email}", web::get().to(get_account))
        .route("/accounts/{email}/check", web::get().to(check_balance))
        .route("/accounts/{email}/debit", web::post().to(debit));
}

async fn list_accounts(ledger: web::Data<LedgerService>) -> ApiResult<HttpResponse> {
    let accounts = ledger.list_accounts().await?;
    Ok(HttpResponse::Ok().json(accounts))
}

async fn get_account(ledger: web::Data<LedgerService>, email: web::Path<String>) -> ApiResult<HttpResponse> {
    let account = ledger.get_account(&email).await?;
    Ok(HttpResponse::Ok().json(account))
}

async fn check_balance(
    ledger: web::Data<LedgerService>,
    email: web::Path<String>,
    query: web::Query<BalanceQuery>,
) -> ApiResult<HttpResponse> {
    let check = ledger.check_balance(&email, query.amount).await?;
    Ok(HttpResponse::Ok().json(check))
}

/// The account in the path wins over the `email` field of the body
async fn debit(
    ledger: web::Data<LedgerService>,
    email: web::Path<String>,
    body: web::Json<DebitRequest>,
) -> ApiResult<HttpResponse> {
    if !body.email.is_empty() && !body.email.eq_ignore_ascii_case(&email) {
        tracing::warn!(path = %email, body = %body.email, "Debit body email differs from path");
    }

    let receipt = ledger.debit(&email, body.amount, body.order_id).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{Account, BalanceCheck, DebitReceipt};
    use crate::metrics::Metrics;
    use crate::store::InMemoryAccountStore;
    use actix_web::{test, App};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ledger(balance: i64) -> web::Data<LedgerService> {
        let store = InMemoryAccountStore::new();
        store.seed(Account {
            customer_email: "alice@example.com".to_string(),
            customer_name: "Alice".to_string(),
            balance: Decimal::new(balance, 0),
        });
        web::Data::new(LedgerService::new(Arc::new(store), Arc::new(Metrics::new().unwrap())))
    }

    #[actix_web::test]
    async fn test_check_balance() {
        let app = test::init_service(App::new().app_data(ledger(500)).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/accounts/alice@example.com/check?amount=300")
            .to_request();
        let check: BalanceCheck = test::call_and_read_body_json(&app, req).await;

        assert_eq!(check.customer_name, "Alice");
        assert_eq!(check.balance, Decimal::new(500, 0));
        assert!(check.sufficient);
    }

    #[actix_web::test]
    async fn test_debit_returns_new_balance() {
        let app = test::init_service(App::new().app_data(ledger(500)).configure(configure)).await;
        let order_id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/accounts/alice@example.com/debit")
            .set_json(serde_json::json!({
                "email": "alice@example.com",
                "amount": 300.0,
                "orderId": order_id,
            }))
            .to_request();
        let receipt: DebitReceipt = test::call_and_read_body_json(&app, req).await;

        assert!(receipt.success);
        assert_eq!(receipt.new_balance, Decimal::new(200, 0));
        assert_eq!(receipt.order_id, order_id);
    }

    #[actix_web::test]
    async fn test_insufficient_balance_is_400() {
        let app = test::init_service(App::new().app_data(ledger(100)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/accounts/alice@example.com/debit")
            .set_json(serde_json::json!({
                "email": "alice@example.com",
                "amount": 300.0,
                "orderId": Uuid::new_v4(),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "INSUFFICIENT_BALANCE");

        // Balance untouched
        let req = test::TestRequest::get().uri("/accounts/alice@example.com").to_request();
        let account: Account = test::call_and_read_body_json(&app, req).await;
        assert_eq!(account.balance, Decimal::new(100, 0));
    }

    #[actix_web::test]
    async fn test_order_id_reused_for_another_amount_is_409() {
        let app = test::init_service(App::new().app_data(ledger(500)).configure(configure)).await;
        let order_id = Uuid::new_v4();

        for (amount, status) in [(300.0, 200), (50.0, 409)] {
            let req = test::TestRequest::post()
                .uri("/accounts/alice@example.com/debit")
                .set_json(serde_json::json!({
                    "email": "alice@example.com",
                    "amount": amount,
                    "orderId": order_id,
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), status);
        }

        let req = test::TestRequest::get().uri("/accounts/alice@example.com").to_request();
        let account: Account = test::call_and_read_body_json(&app, req).await;
        assert_eq!(account.balance, Decimal::new(200, 0));
    }

    #[actix_web::test]
    async fn test_unknown_account_is_404() {
        let app = test::init_service(App::new().app_data(ledger(100)).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/accounts/nobody@example.com/check?amount=1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "ACCOUNT_NOT_FOUND");
    }

    #[actix_web::test]
    async fn test_malformed_amount_is_validation_error() {
        let app = test::init_service(App::new().app_data(ledger(100)).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/accounts/alice@example.com/check?amount=lots")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[actix_web::test]
    async fn test_list_accounts() {
        let app = test::init_service(App::new().app_data(ledger(100)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/accounts").to_request();
        let accounts: Vec<Account> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(accounts.len(), 1);
    }
}
