//! Sale - commission-bearing conversion with a status lifecycle
//!
//! Status is a small state machine:
//!
//! ```text
//!            ┌──► Confirmed
//! Pending ───┼──► Cancelled
//!            └──► Rejected
//! ```
//!
//! Terminal states are immutable. Every applied change is appended to
//! `history`; nothing is overwritten in place.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::arm::ArmId;
use super::offer::OfferId;

/// Sale lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
}

impl SaleStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SaleStatus::Pending)
    }

    /// Whether the commission still counts toward revenue totals
    pub fn counts_as_revenue(&self) -> bool {
        matches!(self, SaleStatus::Pending | SaleStatus::Confirmed)
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleStatus::Pending => write!(f, "pending"),
            SaleStatus::Confirmed => write!(f, "confirmed"),
            SaleStatus::Cancelled => write!(f, "cancelled"),
            SaleStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One entry in a sale's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: SaleStatus,
    /// Unix milliseconds
    pub at: i64,
}

/// Result of applying a status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Pending sale moved to a terminal state
    Applied,
    /// Requested status equals the current non-terminal status
    Unchanged,
    /// Sale was already terminal; nothing changed
    AlreadyTerminal { current: SaleStatus },
}

/// Sale ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Sale ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Arm credited with the conversion
    pub arm_id: ArmId,

    /// Offer that converted
    pub offer_id: OfferId,

    /// Order amount (minor units)
    pub amount: Decimal,

    /// Commission earned (minor units)
    pub commission: Decimal,

    /// ISO 4217 currency code
    pub currency: String,

    /// Current status
    pub status: SaleStatus,

    /// Source channel (e.g., "blog", "tiktok")
    pub source: String,

    /// Upstream network order ID, used for idempotency
    pub external_order_id: Option<String>,

    /// Sale timestamp (Unix milliseconds)
    pub sold_at: i64,

    /// Confirmation timestamp
    pub confirmed_at: Option<i64>,

    /// Append-only status history
    pub history: Vec<StatusChange>,
}

impl Sale {
    /// Create a pending sale
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arm_id: ArmId,
        offer_id: impl Into<OfferId>,
        amount: Decimal,
        commission: Decimal,
        currency: impl Into<String>,
        source: impl Into<String>,
        external_order_id: Option<String>,
        sold_at: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            arm_id,
            offer_id: offer_id.into(),
            amount,
            commission,
            currency: currency.into(),
            status: SaleStatus::Pending,
            source: source.into(),
            external_order_id,
            sold_at,
            confirmed_at: None,
            history: vec![StatusChange {
                status: SaleStatus::Pending,
                at: sold_at,
            }],
        }
    }

    /// Apply a status transition
    pub fn transition(&mut self, to: SaleStatus, at: i64) -> TransitionOutcome {
        if self.status.is_terminal() {
            return TransitionOutcome::AlreadyTerminal {
                current: self.status,
            };
        }
        if to == self.status {
            return TransitionOutcome::Unchanged;
        }

        self.status = to;
        if to == SaleStatus::Confirmed {
            self.confirmed_at = Some(at);
        }
        self.history.push(StatusChange { status: to, at });
        TransitionOutcome::Applied
    }

    /// Commission that counts toward revenue totals
    pub fn counted_commission(&self) -> Decimal {
        if self.status.counts_as_revenue() {
            self.commission
        } else {
            Decimal::ZERO
        }
    }
}
