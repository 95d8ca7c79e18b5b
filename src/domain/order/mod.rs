// ============================================================================
// Order Domain
// ============================================================================
//
// - value_objects: OrderStatus, the create request, priced OrderItem
// - aggregate:     Order and its pricing/transition rules
// - events:        OrderEvent, the snapshot published on the bus
// - errors:        OrderError
// - orchestrator:  the create-order saga
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod value_objects;

pub use aggregate::*;
pub use errors::*;
pub use events::*;
pub use orchestrator::OrderOrchestrator;
pub use value_objects::*;
