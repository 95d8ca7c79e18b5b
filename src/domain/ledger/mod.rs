// ============================================================================
// Ledger Domain - per-customer balances
// ============================================================================
//
// - value_objects: Account and the check/debit request/response shapes
// - errors:        LedgerError
// - service:       LedgerService, the in-process unit of financial truth
// - client:        the `Ledger` seam used by the orchestrator, with an HTTP
//                  implementation for the split deployment
//
// ============================================================================

pub mod client;
pub mod errors;
pub mod service;
pub mod value_objects;

pub use client::{HttpLedgerClient, Ledger, LedgerClientConfig};
pub use errors::LedgerError;
pub use service::LedgerService;
pub use value_objects::*;
