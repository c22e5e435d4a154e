//! Accrual authority boundary.
//!
//! [`AccrualAuthority`] is the seam the worker pool calls through;
//! [`HttpAccrualClient`] is the production implementation against
//! `GET {base}/api/orders/{number}`.
//!
//! The client never retries. Retry and backoff policy belongs to the caller
//! (see `throttle.rs`).

use std::time::Duration;

use gm_schemas::AccrualResponse;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::verdict::{Settlement, TransportError, Verdict};

/// Upstream accrual authority contract.
///
/// Object-safe so the engine can hold an `Arc<dyn AccrualAuthority>`.
#[async_trait::async_trait]
pub trait AccrualAuthority: Send + Sync {
    /// Ask the authority about `order_number`.
    ///
    /// Must return by `deadline`; expiry is reported as
    /// [`TransportError::DeadlineExceeded`].
    async fn fetch_verdict(&self, order_number: &str, deadline: Instant) -> Verdict;
}

/// reqwest-backed authority client.
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, order_number: &str) -> String {
        format!(
            "{}/api/orders/{}",
            self.base_url.trim_end_matches('/'),
            order_number
        )
    }

    async fn query(&self, order_number: &str) -> Result<Verdict, TransportError> {
        let resp = self
            .http
            .get(self.order_url(order_number))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let body: AccrualResponse = resp
                    .json()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                if body.order != order_number {
                    return Err(TransportError::OrderMismatch {
                        requested: order_number.to_string(),
                        returned: body.order,
                    });
                }
                Ok(Verdict::Decided(Settlement::from_response(&body)))
            }
            StatusCode::NO_CONTENT => Ok(Verdict::Pending),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER))?;
                Ok(Verdict::Throttled { retry_after })
            }
            other => Err(TransportError::UnexpectedStatus(other.as_u16())),
        }
    }
}

#[async_trait::async_trait]
impl AccrualAuthority for HttpAccrualClient {
    async fn fetch_verdict(&self, order_number: &str, deadline: Instant) -> Verdict {
        match tokio::time::timeout_at(deadline, self.query(order_number)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => Verdict::TransportFailure(err),
            Err(_) => Verdict::TransportFailure(TransportError::DeadlineExceeded),
        }
    }
}

/// `Retry-After` as integer seconds. The HTTP-date form is not accepted:
/// without a trustworthy clock offset the delay cannot be derived safely.
pub fn parse_retry_after(value: Option<&HeaderValue>) -> Result<Duration, TransportError> {
    let Some(value) = value else {
        return Err(TransportError::MalformedRetryAfter(None));
    };
    let raw = value
        .to_str()
        .map_err(|_| TransportError::MalformedRetryAfter(Some(format!("{value:?}"))))?;
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| TransportError::MalformedRetryAfter(Some(raw.to_string())))
}
