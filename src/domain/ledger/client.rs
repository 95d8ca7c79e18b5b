use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::FailureKind;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryConfig};
use super::errors::LedgerError;
use super::service::LedgerService;
use super::value_objects::{BalanceCheck, DebitReceipt, DebitRequest};

// ============================================================================
// Ledger seam
// ============================================================================
//
// The orchestrator only knows this trait. Two implementations:
// - LedgerService:    in-process (standalone mode, tests)
// - HttpLedgerClient: remote ledger over HTTP with per-attempt timeout, a
//                     bounded retry budget on transient failures and a
//                     circuit breaker
//
// ============================================================================

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn check_balance(&self, email: &str, amount: Decimal) -> Result<BalanceCheck, LedgerError>;

    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitReceipt, LedgerError>;
}

#[async_trait]
impl Ledger for LedgerService {
    async fn check_balance(&self, email: &str, amount: Decimal) -> Result<BalanceCheck, LedgerError> {
        LedgerService::check_balance(self, email, amount).await
    }

    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitReceipt, LedgerError> {
        LedgerService::debit(self, email, amount, reference_id).await
    }
}

#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub base_url: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout: Duration::from_secs(2),
            retry: RetryConfig::conservative(),
        }
    }
}

pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

/// What a call is about, used to rebuild domain errors from a remote failure
#[derive(Debug, Clone, Copy)]
struct CallTarget<'a> {
    email: &'a str,
    amount: Decimal,
    reference_id: Option<Uuid>,
}

/// Error body returned by the ledger's HTTP API
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteError {
    code: String,
    message: String,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerClientConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let base_url = Url::parse(&config.base_url)?;
        let breaker = CircuitBreaker::new("ledger", CircuitBreakerConfig::default())
            .with_gauge(metrics.breaker_gauge("ledger"));

        tracing::info!(
            base_url = %base_url,
            timeout_ms = config.timeout.as_millis() as u64,
            max_attempts = config.retry.max_attempts,
            "Ledger HTTP client configured"
        );

        Ok(Self {
            http,
            base_url,
            retry: config.retry,
            breaker,
            metrics,
        })
    }

    /// `{base}/accounts/{email}/{action}` with the email percent-encoded
    fn account_url(&self, email: &str, action: &str) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::Protocol(format!("ledger base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["accounts", email, action]);
        Ok(url)
    }

    async fn call<T, B>(&self, operation: &'static str, build: B, target: CallTarget<'_>) -> Result<T, LedgerError>
    where
        T: DeserializeOwned,
        B: Fn() -> RequestBuilder,
    {
        let started = Instant::now();

        let result = retry_on_transient(self.retry.clone(), |attempt| {
            let request = build();
            async move {
                tracing::debug!(attempt = attempt, operation = operation, email = %target.email, "Calling ledger");
                match self.breaker.call(send::<T>(request, target)).await {
                    Ok(value) => Ok(value),
                    Err(CircuitBreakerError::CircuitOpen) => {
                        Err(LedgerError::Unavailable("circuit breaker open".to_string()))
                    }
                    Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
                }
            }
        })
        .await
        .into_result();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().code(),
        };
        self.metrics
            .record_ledger_call(operation, started.elapsed().as_secs_f64(), outcome);

        result
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder, target: CallTarget<'_>) -> Result<T, LedgerError> {
    let response = request
        .send()
        .await
        .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Protocol(e.to_string()));
    }

    if status.is_server_error() {
        return Err(LedgerError::Unavailable(format!("ledger responded {}", status)));
    }

    let remote = response.json::<RemoteError>().await.unwrap_or_default();
    Err(map_failure(status, remote, target))
}

/// Rebuild the ledger's own error from a 4xx response
fn map_failure(status: StatusCode, remote: RemoteError, target: CallTarget<'_>) -> LedgerError {
    match (FailureKind::from_code(&remote.code), target.reference_id) {
        (Some(FailureKind::AccountNotFound), _) => LedgerError::AccountNotFound(target.email.to_string()),
        (Some(FailureKind::InsufficientBalance), _) => LedgerError::InsufficientBalance {
            email: target.email.to_string(),
            required: target.amount,
        },
        (Some(FailureKind::Validation), _) => LedgerError::InvalidAmount(target.amount),
        (Some(FailureKind::DuplicateReference), Some(reference_id)) => LedgerError::ReferenceConflict { reference_id },
        (Some(FailureKind::DownstreamUnavailable), _) => LedgerError::Unavailable(remote.message),
        _ if status == StatusCode::NOT_FOUND => LedgerError::AccountNotFound(target.email.to_string()),
        _ => LedgerError::Protocol(format!("ledger responded {}: {}", status, remote.message)),
    }
}

#[async_trait]
impl Ledger for HttpLedgerClient {
    async fn check_balance(&self, email: &str, amount: Decimal) -> Result<BalanceCheck, LedgerError> {
        let url = self.account_url(email, "check")?;
        let query = [("amount", amount.to_string())];

        self.call(
            "check_balance",
            || self.http.get(url.clone()).query(&query),
            CallTarget {
                email,
                amount,
                reference_id: None,
            },
        )
        .await
    }

    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitReceipt, LedgerError> {
        let url = self.account_url(email, "debit")?;
        let body = DebitRequest {
            email: email.to_string(),
            amount,
            order_id: reference_id,
        };

        let target = CallTarget {
            email,
            amount,
            reference_id: Some(reference_id),
        };
        self.call("debit", || self.http.post(url.clone()).json(&body), target)
            .await
    }
}
