// ============================================================================
// Service wiring
// ============================================================================
//
// Each `run_*` function builds one deployable service out of the pieces in
// the rest of the crate and blocks until its HTTP server stops:
//
//   orders         Postgres catalog/orders/DLQ + HTTP ledger client
//                  + outbox relay publishing to Redpanda        :8080
//   ledger         Postgres accounts                            :8081
//   analytics      Redpanda consumer -> Postgres warehouse      :8082
//   notifications  Redpanda consumer -> log notifier            :8083
//   standalone     all of the above in one process on in-memory
//                  stores and bus, seeded with demo data        :8080
//
// Every service also serves GET /health and GET /metrics.
//
// ============================================================================

use actix_web::{web, App, HttpServer};
use kameo::Actor;
use std::sync::Arc;

use crate::actors::{DlqActor, OutboxRelay};
use crate::api;
use crate::config::{AnalyticsArgs, Command, LedgerArgs, NotificationArgs, OrdersArgs, StandaloneArgs};
use crate::consumers::{run_subscriber, AnalyticsConsumer, LogNotifier, NotificationConsumer};
use crate::domain::ledger::{HttpLedgerClient, LedgerService};
use crate::domain::order::{OrderOrchestrator, ORDER_EVENTS_TOPIC};
use crate::messaging::{InMemoryBus, KafkaSubscriber, RedpandaPublisher};
use crate::metrics::{self, Metrics, ServiceName};
use crate::store::postgres::{self, PgAccountStore, PgCatalog, PgDeadLetterStore, PgOrderStore, PgWarehouse};
use crate::store::{
    InMemoryAccountStore, InMemoryCatalog, InMemoryDeadLetterStore, InMemoryOrderStore, InMemoryWarehouse, Warehouse,
};

const NOTIFICATION_GROUP: &str = "order-notification-group";
const ANALYTICS_GROUP: &str = "order-analytics-group";

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Orders(args) => run_orders(args).await,
        Command::Ledger(args) => run_ledger(args).await,
        Command::Notifications(args) => run_notifications(args).await,
        Command::Analytics(args) => run_analytics(args).await,
        Command::Standalone(args) => run_standalone(args).await,
    }
}

/// Serve the shared /health and /metrics routes plus `routes` until shutdown
async fn serve<F>(bind: &str, service: &'static str, metrics: Arc<Metrics>, routes: F) -> anyhow::Result<()>
where
    F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
{
    let metrics = web::Data::from(metrics);

    tracing::info!(bind = %bind, service = service, "🌐 HTTP server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(metrics.clone())
            .app_data(web::Data::new(ServiceName(service)))
            .configure(metrics::configure)
            .configure(routes.clone())
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!(service = service, "HTTP server stopped");
    Ok(())
}

async fn run_orders(args: OrdersArgs) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting order service");

    let metrics = Arc::new(Metrics::new()?);
    let pool = postgres::connect(&args.database.database_url, args.database.max_connections).await?;

    let orders = Arc::new(PgOrderStore::new(pool.clone()));
    let ledger = Arc::new(HttpLedgerClient::new(args.ledger.client_config(), metrics.clone())?);
    tracing::info!(ledger_url = %args.ledger.ledger_url, "Using remote ledger");

    let orchestrator = web::Data::new(OrderOrchestrator::new(
        Arc::new(PgCatalog::new(pool.clone())),
        orders.clone(),
        ledger,
        metrics.clone(),
        args.bus.topic.clone(),
    ));

    let publisher = Arc::new(RedpandaPublisher::new(&args.bus.brokers, &metrics)?);
    let dlq = DlqActor::spawn(DlqActor::new(Arc::new(PgDeadLetterStore::new(pool)), metrics.clone()));
    let relay = OutboxRelay::spawn(OutboxRelay::new(
        orders,
        publisher,
        dlq.clone(),
        metrics.clone(),
        args.outbox.relay_config(),
    ));

    let dlq_data = web::Data::new(dlq);
    let result = serve(&args.bind, "order-service", metrics, move |cfg| {
        cfg.app_data(orchestrator.clone())
            .app_data(dlq_data.clone())
            .configure(api::orders::configure);
    })
    .await;

    relay.kill();
    result
}

async fn run_ledger(args: LedgerArgs) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting ledger service");

    let metrics = Arc::new(Metrics::new()?);
    let pool = postgres::connect(&args.database.database_url, args.database.max_connections).await?;
    let ledger = web::Data::new(LedgerService::new(Arc::new(PgAccountStore::new(pool)), metrics.clone()));

    serve(&args.bind, "ledger-service", metrics, move |cfg| {
        cfg.app_data(ledger.clone()).configure(api::accounts::configure);
    })
    .await
}

async fn run_notifications(args: NotificationArgs) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting notification service");

    let metrics = Arc::new(Metrics::new()?);
    let source = Arc::new(KafkaSubscriber::new(&args.bus.brokers, &args.group_id, &args.bus.topic)?);
    let consumer = Arc::new(NotificationConsumer::new(Arc::new(LogNotifier)));

    let subscriber = tokio::spawn(run_subscriber(source, consumer, metrics.clone()));
    let result = serve(&args.bind, "notification-service", metrics, |_| {}).await;

    subscriber.abort();
    result
}

async fn run_analytics(args: AnalyticsArgs) -> anyhow::Result<()> {
    tracing::info!(log_only = args.warehouse.log_only, "🚀 Starting analytics service");

    let metrics = Arc::new(Metrics::new()?);
    let pool = postgres::connect(&args.database.database_url, args.database.max_connections).await?;
    let warehouse: Arc<dyn Warehouse> = Arc::new(PgWarehouse::new(pool));

    let source = Arc::new(KafkaSubscriber::new(&args.bus.brokers, &args.group_id, &args.bus.topic)?);
    let consumer = Arc::new(AnalyticsConsumer::new(
        warehouse.clone(),
        args.warehouse.analytics_config(),
    ));

    let subscriber = tokio::spawn(run_subscriber(source, consumer, metrics.clone()));

    let warehouse = web::Data::new(warehouse);
    let result = serve(&args.bind, "analytics-service", metrics, move |cfg| {
        cfg.app_data(warehouse.clone()).configure(api::analytics::configure);
    })
    .await;

    subscriber.abort();
    result
}

async fn run_standalone(args: StandaloneArgs) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting all services in one process (in-memory stores and bus)");

    let metrics = Arc::new(Metrics::new()?);
    let bus = InMemoryBus::new();

    let ledger = Arc::new(LedgerService::new(
        Arc::new(InMemoryAccountStore::with_demo_accounts()),
        metrics.clone(),
    ));
    let orders = Arc::new(InMemoryOrderStore::new());
    let orchestrator = web::Data::new(OrderOrchestrator::new(
        Arc::new(InMemoryCatalog::with_demo_products()),
        orders.clone(),
        ledger.clone(),
        metrics.clone(),
        ORDER_EVENTS_TOPIC,
    ));

    let dlq = DlqActor::spawn(DlqActor::new(Arc::new(InMemoryDeadLetterStore::new()), metrics.clone()));
    let relay = OutboxRelay::spawn(OutboxRelay::new(
        orders,
        bus.clone(),
        dlq.clone(),
        metrics.clone(),
        args.outbox.relay_config(),
    ));

    let warehouse: Arc<dyn Warehouse> = Arc::new(InMemoryWarehouse::new());
    let notifications = tokio::spawn(run_subscriber(
        Arc::new(bus.subscribe(NOTIFICATION_GROUP, ORDER_EVENTS_TOPIC)),
        Arc::new(NotificationConsumer::new(Arc::new(LogNotifier))),
        metrics.clone(),
    ));
    let analytics = tokio::spawn(run_subscriber(
        Arc::new(bus.subscribe(ANALYTICS_GROUP, ORDER_EVENTS_TOPIC)),
        Arc::new(AnalyticsConsumer::new(warehouse.clone(), args.warehouse.analytics_config())),
        metrics.clone(),
    ));

    let ledger = web::Data::from(ledger);
    let dlq_data = web::Data::new(dlq);
    let warehouse = web::Data::new(warehouse);
    let result = serve(&args.bind, "order-fulfillment", metrics, move |cfg| {
        cfg.app_data(orchestrator.clone())
            .app_data(dlq_data.clone())
            .app_data(ledger.clone())
            .app_data(warehouse.clone())
            .configure(api::orders::configure)
            .configure(api::accounts::configure)
            .configure(api::analytics::configure);
    })
    .await;

    relay.kill();
    bus.close();
    let _ = tokio::join!(notifications, analytics);
    result
}
