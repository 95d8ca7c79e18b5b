// ============================================================================
// Postgres stores (sqlx)
// ============================================================================
//
// Isolation: READ COMMITTED (the Postgres default). Anything that needs a
// stronger guarantee takes an explicit row lock:
// - accounts: `SELECT ... FOR UPDATE` serializes debits per account
// - orders:   status change and outbox insert share one transaction
//
// ============================================================================

mod accounts;
mod catalog;
mod dead_letters;
mod orders;
mod warehouse;

pub use accounts::PgAccountStore;
pub use catalog::PgCatalog;
pub use dead_letters::PgDeadLetterStore;
pub use orders::PgOrderStore;
pub use warehouse::PgWarehouse;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect and bring the schema up to date
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    tracing::info!(max_connections = max_connections, "Connecting to Postgres...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("✅ Database migrations applied");

    Ok(pool)
}
