use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::actors::RelayConfig;
use crate::consumers::AnalyticsConfig;
use crate::domain::ledger::LedgerClientConfig;
use crate::domain::order::ORDER_EVENTS_TOPIC;
use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// One subcommand per runnable service. Every option can also come from the
// environment (or a `.env` file), which is how the services are configured
// in containers.
//
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "order-fulfillment", version, about = "Order fulfillment services")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Order API, create-order saga and outbox relay
    Orders(OrdersArgs),
    /// Ledger API: balances and debits
    Ledger(LedgerArgs),
    /// Notification consumer
    Notifications(NotificationArgs),
    /// Analytics consumer and read API
    Analytics(AnalyticsArgs),
    /// Everything in one process on in-memory stores and bus, seeded with demo data
    Standalone(StandaloneArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Args)]
pub struct BusArgs {
    #[arg(long, env = "KAFKA_BROKERS", default_value = "127.0.0.1:9092")]
    pub brokers: String,

    #[arg(long, env = "ORDER_EVENTS_TOPIC", default_value = ORDER_EVENTS_TOPIC)]
    pub topic: String,
}

#[derive(Debug, Clone, Args)]
pub struct OutboxArgs {
    #[arg(long, env = "OUTBOX_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "OUTBOX_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: i64,

    /// How long a relay keeps a claimed batch before other replicas may take it
    #[arg(long, env = "OUTBOX_CLAIM_LEASE_SECS", default_value_t = 60)]
    pub claim_lease_secs: u64,

    /// Publish attempts per message before it is dead-lettered
    #[arg(long, env = "OUTBOX_MAX_ATTEMPTS", default_value_t = 5)]
    pub publish_attempts: u32,
}

impl OutboxArgs {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            batch_size: self.batch_size.max(1),
            claim_lease: Duration::from_secs(self.claim_lease_secs.max(1)),
            retry: RetryConfig::aggressive().with_max_attempts(self.publish_attempts),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct LedgerClientArgs {
    #[arg(long, env = "LEDGER_URL", default_value = "http://127.0.0.1:8081")]
    pub ledger_url: String,

    /// Per-attempt timeout for ledger calls
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value_t = 2000)]
    pub ledger_timeout_ms: u64,

    #[arg(long, env = "LEDGER_MAX_ATTEMPTS", default_value_t = 2)]
    pub ledger_attempts: u32,
}

impl LedgerClientArgs {
    pub fn client_config(&self) -> LedgerClientConfig {
        LedgerClientConfig {
            base_url: self.ledger_url.clone(),
            timeout: Duration::from_millis(self.ledger_timeout_ms),
            retry: RetryConfig::conservative().with_max_attempts(self.ledger_attempts),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct OrdersArgs {
    #[arg(long, env = "ORDERS_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub bus: BusArgs,

    #[command(flatten)]
    pub outbox: OutboxArgs,

    #[command(flatten)]
    pub ledger: LedgerClientArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LedgerArgs {
    #[arg(long, env = "LEDGER_BIND", default_value = "0.0.0.0:8081")]
    pub bind: String,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

#[derive(Debug, Clone, Args)]
pub struct NotificationArgs {
    /// Serves /health and /metrics
    #[arg(long, env = "NOTIFICATIONS_BIND", default_value = "0.0.0.0:8083")]
    pub bind: String,

    #[arg(long, env = "NOTIFICATION_GROUP_ID", default_value = "order-notification-group")]
    pub group_id: String,

    #[command(flatten)]
    pub bus: BusArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyticsArgs {
    #[arg(long, env = "ANALYTICS_BIND", default_value = "0.0.0.0:8082")]
    pub bind: String,

    #[arg(long, env = "ANALYTICS_GROUP_ID", default_value = "order-analytics-group")]
    pub group_id: String,

    #[command(flatten)]
    pub warehouse: WarehouseArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub bus: BusArgs,
}

#[derive(Debug, Clone, Args)]
pub struct WarehouseArgs {
    /// Log warehouse writes instead of performing them
    #[arg(long, env = "ANALYTICS_LOG_ONLY")]
    pub log_only: bool,

    #[arg(long, env = "ANALYTICS_MAX_ATTEMPTS", default_value_t = 3)]
    pub write_attempts: u32,
}

impl WarehouseArgs {
    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            log_only: self.log_only,
            retry: RetryConfig::default().with_max_attempts(self.write_attempts),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct StandaloneArgs {
    #[arg(long, env = "STANDALONE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[command(flatten)]
    pub outbox: OutboxArgs,

    #[command(flatten)]
    pub warehouse: WarehouseArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_orders_defaults() {
        let cli = Cli::try_parse_from(["order-fulfillment", "orders", "--database-url", "postgres://localhost/orders"])
            .unwrap();
        let Command::Orders(args) = cli.command else {
            panic!("expected orders subcommand");
        };

        assert_eq!(args.bus.topic, "order-events");
        assert_eq!(args.ledger.client_config().timeout, Duration::from_secs(2));
        assert_eq!(args.outbox.relay_config().retry.max_attempts, 5);
        assert_eq!(args.outbox.relay_config().claim_lease, Duration::from_secs(60));
    }

    #[test]
    fn test_analytics_log_only_flag() {
        let cli = Cli::try_parse_from([
            "order-fulfillment",
            "analytics",
            "--database-url",
            "postgres://localhost/analytics",
            "--log-only",
        ])
        .unwrap();
        let Command::Analytics(args) = cli.command else {
            panic!("expected analytics subcommand");
        };

        assert!(args.warehouse.analytics_config().log_only);
        assert_eq!(args.group_id, "order-analytics-group");
    }
}
