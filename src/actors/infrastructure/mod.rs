// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Background workers of the order service:
// - outbox relay (periodic publish with retry)
// - dead letter queue
//
// ============================================================================

mod dlq;
mod outbox_relay;

pub use dlq::{AddToDlq, DlqActor, GetDeadLetters};
pub use outbox_relay::{OutboxRelay, RelayConfig};
