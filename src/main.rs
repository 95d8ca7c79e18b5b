use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod bootstrap;
mod config;
mod consumers;
mod domain;
mod messaging;
mod metrics;
mod store;
mod utils;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    dotenvy::dotenv().ok();

    let cli = config::Cli::parse();

    // Default to INFO, overridable with RUST_LOG
    // Example: RUST_LOG=debug order_fulfillment standalone
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_fulfillment=debug")),
        )
        .init();

    bootstrap::run(cli.command).await
}
