// ============================================================================
// Actors Module
// ============================================================================
//
// kameo actors for infrastructure concerns only. Order placement runs on the
// request task through the OrderOrchestrator; actors handle what happens
// after the commit.
//
// ============================================================================

mod infrastructure;

pub use infrastructure::{DlqActor, GetDeadLetters, OutboxRelay, RelayConfig};
