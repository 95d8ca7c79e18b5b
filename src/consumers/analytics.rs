use async_trait::async_trait;
use std::sync::Arc;

use super::{ConsumerError, MessageHandler};
use crate::domain::analytics::{CustomerDimension, FactOrderItem, ProductDimension};
use crate::domain::order::OrderEvent;
use crate::messaging::BusMessage;
use crate::store::{StoreError, Warehouse};
use crate::utils::{retry_on_transient, RetryConfig};

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Log the writes that would happen instead of touching the warehouse
    pub log_only: bool,
    /// Budget for transient warehouse failures, per event
    pub retry: RetryConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            log_only: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Materializes each OrderEvent into the star schema: customer, date and
/// product dimensions, then one fact per line item.
///
/// Dimension writes are upserts on their natural keys and facts are
/// insert-or-ignore on (order id, product id), so a redelivered event
/// leaves the warehouse unchanged.
pub struct AnalyticsConsumer {
    warehouse: Arc<dyn Warehouse>,
    config: AnalyticsConfig,
}

impl AnalyticsConsumer {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: AnalyticsConfig) -> Self {
        if config.log_only {
            tracing::warn!("Analytics consumer in log-only mode, warehouse writes disabled");
        }
        Self { warehouse, config }
    }

    /// Returns the number of fact rows written
    async fn materialize(&self, event: &OrderEvent) -> Result<usize, StoreError> {
        let customer_key = self
            .warehouse
            .upsert_customer(&CustomerDimension::from_event(event))
            .await?;
        let date_key = self.warehouse.upsert_date(event.order_date.date_naive()).await?;

        let mut written = 0;
        for item in &event.items {
            let product_key = self
                .warehouse
                .upsert_product(&ProductDimension::from_item(item))
                .await?;

            let fact = FactOrderItem {
                order_id: event.order_id,
                product_id: item.product_id,
                customer_key,
                date_key,
                product_key,
                order_date: event.order_date,
                status: event.status,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            };

            if self.warehouse.insert_fact(&fact).await? {
                written += 1;
            } else {
                tracing::debug!(
                    order_id = %event.order_id,
                    product_id = item.product_id,
                    "Fact already loaded, skipping"
                );
            }
        }

        Ok(written)
    }

    fn log_planned_writes(&self, event: &OrderEvent) {
        tracing::info!(
            email = %event.customer_email,
            name = %event.customer_name,
            "[log-only] would upsert dim_customer"
        );
        tracing::info!(day = %event.order_date.date_naive(), "[log-only] would upsert dim_date");
        for item in &event.items {
            tracing::info!(
                order_id = %event.order_id,
                product_id = item.product_id,
                product = %item.product_name,
                quantity = item.quantity,
                line_total = %item.line_total,
                "[log-only] would insert fact_order_items"
            );
        }
    }
}

#[async_trait]
impl MessageHandler for AnalyticsConsumer {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn handle(&self, message: &BusMessage) -> Result<(), ConsumerError> {
        let event = OrderEvent::decode(&message.payload).map_err(|e| {
            tracing::warn!(payload = %message.payload, error = %e, "Failed to parse order event");
            e
        })?;

        tracing::info!(order_id = %event.order_id, items = event.items.len(), "Analytics: received order event");

        if self.config.log_only {
            self.log_planned_writes(&event);
            return Ok(());
        }

        let written = retry_on_transient(self.config.retry.clone(), |_| self.materialize(&event))
            .await
            .into_result()?;

        tracing::info!(order_id = %event.order_id, facts_written = written, "Order loaded into warehouse");
        Ok(())
    }
}
