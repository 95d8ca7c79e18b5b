// ============================================================================
// HTTP API (actix-web)
// ============================================================================
//
// One `configure` per service, mounted by the bootstrap for the mode being
// run. Every handler returns `ApiResult`, so failures share one JSON body:
// {timestamp, status, error, code, message}.
//
// - orders:    POST/GET /orders, GET /orders/{id}, GET /dead-letters
// - accounts:  the ledger (GET /accounts..., POST /accounts/{email}/debit)
// - analytics: GET /analytics/...
//
// ============================================================================

pub mod accounts;
pub mod analytics;
pub mod error;
pub mod orders;
