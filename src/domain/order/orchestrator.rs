use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::ledger::{Ledger, LedgerError};
use crate::metrics::Metrics;
use crate::store::{OrderStore, OutboxMessage, ProductCatalog};
use crate::utils::IsTransient;
use super::aggregate::{Order, PricedLine};
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::OrderRequest;

// ============================================================================
// Order Orchestrator - the create-order saga
// ============================================================================
//
// 1. validate the request                     (no side effects)
// 2. price it against the catalog             (no side effects)
// 3. ledger.check_balance                     (no side effects)
// 4. persist the order as PENDING_DEBIT
// 5. ledger.debit
//    - ok:   CONFIRMED + outbox row, one transaction
//    - fail: DEBIT_FAILED_COMPENSATING, ledger error returned
//
// A zero total skips steps 3 and 5; there is nothing to charge.
//
// A transient debit failure leaves the outcome unknown: the ledger may have
// committed before the response was lost. Those orders are logged and counted
// separately. Replaying the debit with the order id as reference settles it,
// since the ledger applies a reference at most once.
//
// Publishing happens later, from the outbox (see actors::outbox_relay).
//
// ============================================================================

pub struct OrderOrchestrator {
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn Ledger>,
    metrics: Arc<Metrics>,
    topic: String,
}

impl OrderOrchestrator {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn Ledger>,
        metrics: Arc<Metrics>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            orders,
            ledger,
            metrics,
            topic: topic.into(),
        }
    }

    pub async fn create_order(&self, request: OrderRequest) -> Result<Order, OrderError> {
        let result = self.run_saga(request).await;

        match &result {
            Ok(order) => {
                self.metrics.orders_created.inc();
                tracing::info!(
                    order_id = %order.id,
                    total_amount = %order.total_amount,
                    item_count = order.item_count(),
                    "✅ Order confirmed"
                );
            }
            Err(e) => {
                self.metrics.record_order_rejected(e.kind().code());
                tracing::warn!(error = %e, code = e.kind().code(), "Order rejected");
            }
        }

        result
    }

    async fn run_saga(&self, request: OrderRequest) -> Result<Order, OrderError> {
        let request = request.validated()?;
        let lines = self.price(&request).await?;
        let mut order = Order::pending(&request, &lines);

        let chargeable = order.total_amount > Decimal::ZERO;

        if chargeable {
            let check = self
                .ledger
                .check_balance(&order.customer_email, order.total_amount)
                .await?;
            if !check.sufficient {
                tracing::info!(
                    email = %order.customer_email,
                    balance = %check.balance,
                    required = %order.total_amount,
                    "Balance check failed, nothing written"
                );
                return Err(LedgerError::InsufficientBalance {
                    email: order.customer_email.clone(),
                    required: order.total_amount,
                }
                .into());
            }
        }

        self.orders.insert_order(&order).await?;
        tracing::debug!(order_id = %order.id, "Order persisted as PENDING_DEBIT");

        if !chargeable {
            tracing::debug!(order_id = %order.id, "Zero total, no debit needed");
        } else if let Err(debit_error) = self
            .ledger
            .debit(&order.customer_email, order.total_amount, order.id)
            .await
        {
            self.compensate(&mut order, &debit_error).await?;
            return Err(debit_error.into());
        }

        order.confirm()?;
        let outbox = self.outbox_message(&order, &lines);

        if let Err(e) = self.orders.confirm_with_outbox(order.id, outbox).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Debit applied but confirmation could not be stored, order left PENDING_DEBIT"
            );
            return Err(e.into());
        }

        Ok(order)
    }

    /// Resolve every requested product; unknown or inactive ids fail the order
    async fn price(&self, request: &OrderRequest) -> Result<Vec<PricedLine>, OrderError> {
        let mut lines = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let product = self
                .catalog
                .find_product(item.product_id)
                .await?
                .filter(|p| p.is_orderable())
                .ok_or(OrderError::ProductNotFound(item.product_id))?;

            lines.push(PricedLine {
                product,
                quantity: item.quantity,
            });
        }

        Ok(lines)
    }

    async fn compensate(&self, order: &mut Order, cause: &LedgerError) -> Result<(), OrderError> {
        order.fail_debit()?;

        if debit_outcome_unknown(cause) {
            self.metrics.debits_outcome_unknown.inc();
            tracing::error!(
                order_id = %order.id,
                email = %order.customer_email,
                amount = %order.total_amount,
                error = %cause,
                "Debit outcome unknown, ledger may have applied it; replay the debit with the order id to settle"
            );
        } else {
            tracing::warn!(
                order_id = %order.id,
                error = %cause,
                "Debit failed after persisting order, marking DEBIT_FAILED_COMPENSATING"
            );
        }

        if let Err(e) = self.orders.update_status(order.id, order.status).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Failed to record compensating status"
            );
        }
        Ok(())
    }

    /// An encoding failure is logged and the order is confirmed without an event
    fn outbox_message(&self, order: &Order, lines: &[PricedLine]) -> Option<OutboxMessage> {
        let event = OrderEvent::snapshot(order, lines);

        match event.encode() {
            Ok(payload) => Some(OutboxMessage {
                id: Uuid::now_v7(),
                aggregate_id: order.id,
                event_type: OrderEvent::EVENT_TYPE.to_string(),
                topic: self.topic.clone(),
                partition_key: event.key(),
                payload,
                created_at: Utc::now(),
            }),
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Failed to encode OrderEvent, order confirmed without event"
                );
                None
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_orders().await?)
    }
}

/// A transient failure may hide a debit the ledger committed before the
/// response was lost. Definite rejections never applied anything.
fn debit_outcome_unknown(cause: &LedgerError) -> bool {
    cause.is_transient()
}
