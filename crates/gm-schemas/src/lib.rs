//! gm-schemas
//!
//! Shared order-ledger types and the accrual authority's wire vocabulary.
//! No IO lives here.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Ledger status of a loyalty order.
///
/// `NEW` and `PROCESSING` are pending (eligible for reconciliation);
/// `PROCESSED` and `INVALID` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One row of the order ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Caller-supplied order number; Luhn-valid by the time it is stored.
    pub number: String,
    pub status: OrderStatus,
    /// Set exactly once, when the order becomes `PROCESSED`.
    pub reward: Option<f64>,
    /// Owning account id. Immutable after creation.
    pub owner: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// Fresh `NEW` order with no reward, uploaded now.
    pub fn new(number: impl Into<String>, owner: i64) -> Self {
        Self {
            number: number.into(),
            status: OrderStatus::New,
            reward: None,
            owner,
            uploaded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Accrual authority wire types
// ---------------------------------------------------------------------------

/// Order status as reported by the accrual authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    /// Known to the authority, computation not started.
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    /// Ledger status this authority status settles an order into.
    pub fn ledger_status(&self) -> OrderStatus {
        match self {
            AccrualStatus::Registered | AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

/// Body of `GET /api/orders/{number}` when the authority answers 200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

// ---------------------------------------------------------------------------
// Order number checksum
// ---------------------------------------------------------------------------

/// Luhn checksum over an ASCII-digit order number.
///
/// Empty input and any non-digit character are invalid.
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum: u32 = 0;
    let mut double = false;
    for b in number.bytes().rev() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(b - b'0');
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }

    sum % 10 == 0
}
