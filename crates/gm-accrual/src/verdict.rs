//! Typed outcome of one accrual-authority query.

use std::fmt;
use std::time::Duration;

use gm_schemas::{AccrualResponse, OrderStatus};

/// What the authority said about one order.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Authoritative outcome; the ledger should be updated to match.
    Decided(Settlement),
    /// The authority is rate-limiting this caller.
    Throttled { retry_after: Duration },
    /// 204: the authority has not started on this order yet.
    Pending,
    /// No usable answer. Never mutates ledger state.
    TransportFailure(TransportError),
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Ledger update derived from an authority response.
///
/// Invariant: `reward.is_some()` iff `status == PROCESSED`. The only
/// constructors are [`Settlement::from_response`] and [`Settlement::new`],
/// both of which enforce it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    status: OrderStatus,
    reward: Option<f64>,
}

impl Settlement {
    /// `reward` is kept only for `PROCESSED`; `PROCESSED` without a reward
    /// settles at zero.
    pub fn new(status: OrderStatus, reward: Option<f64>) -> Self {
        let reward = match status {
            OrderStatus::Processed => Some(reward.unwrap_or(0.0)),
            _ => None,
        };
        Self { status, reward }
    }

    pub fn from_response(resp: &AccrualResponse) -> Self {
        Self::new(resp.status.ledger_status(), resp.accrual)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn reward(&self) -> Option<f64> {
        self.reward
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Why a query produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connect / send / body read failure.
    Request(String),
    /// Any status other than 200, 204 or 429.
    UnexpectedStatus(u16),
    /// 429 whose `Retry-After` is missing or not integer seconds.
    MalformedRetryAfter(Option<String>),
    /// 200 body that does not decode as an accrual response.
    Decode(String),
    /// 200 body describing a different order than the one requested.
    OrderMismatch { requested: String, returned: String },
    /// The per-order deadline passed before an answer arrived.
    DeadlineExceeded,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Request(msg) => write!(f, "request failed: {msg}"),
            TransportError::UnexpectedStatus(code) => {
                write!(f, "unexpected authority status: {code}")
            }
            TransportError::MalformedRetryAfter(Some(raw)) => {
                write!(f, "malformed Retry-After header: {raw:?}")
            }
            TransportError::MalformedRetryAfter(None) => {
                write!(f, "429 without Retry-After header")
            }
            TransportError::Decode(msg) => write!(f, "decode error: {msg}"),
            TransportError::OrderMismatch {
                requested,
                returned,
            } => write!(
                f,
                "authority answered for order {returned} when asked for {requested}"
            ),
            TransportError::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for TransportError {}
