//! Error types for Offerflow
//!
//! Provides a unified error type and domain-specific error variants.
//! Replays and terminal-state transitions are outcomes, not errors.

use thiserror::Error;

/// Result type alias using OfferflowError
pub type Result<T> = std::result::Result<T, OfferflowError>;

/// Unified error type for Offerflow operations
#[derive(Debug, Error)]
pub enum OfferflowError {
    // Lookup errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    // Boundary validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    // State machine violations surfaced to internal callers
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OfferflowError {
    /// Unknown arm
    pub fn arm_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Arm,
            id: id.to_string(),
        }
    }

    /// Unknown sale
    pub fn sale_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Sale,
            id: id.to_string(),
        }
    }

    /// No offer could be selected or suggested for a content item
    pub fn no_offer(content_item_id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Offer,
            id: content_item_id.to_string(),
        }
    }

    /// Whether the caller should degrade gracefully instead of failing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Entity kinds referenced by `NotFound`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Arm,
    Offer,
    Sale,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Arm => write!(f, "Arm"),
            EntityKind::Offer => write!(f, "Offer"),
            EntityKind::Sale => write!(f, "Sale"),
        }
    }
}

/// Input rejected at the core boundary
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Offer {offer_id} has negative price {price}")]
    NegativePrice { offer_id: String, price: i64 },

    #[error("Offer {offer_id} has negative commission rate {bps}bps")]
    NegativeCommission { offer_id: String, bps: i64 },

    #[error("Malformed date range: {start} is after {end}")]
    MalformedDateRange { start: String, end: String },

    #[error("Event window {code} ends ({end_ts}) before it starts ({start_ts})")]
    MalformedWindow {
        code: String,
        start_ts: i64,
        end_ts: i64,
    },

    #[error("Boost multiplier must be positive and finite, got {0}")]
    InvalidMultiplier(f64),

    #[error("Amount must not be negative: {0}")]
    NegativeAmount(String),

    #[error("Revenue for arm {arm_id} would overflow when adding {amount}")]
    RevenueOverflow { arm_id: String, amount: String },

    #[error("Required field missing: {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for OfferflowError {
    fn from(err: serde_json::Error) -> Self {
        OfferflowError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OfferflowError {
    fn from(err: anyhow::Error) -> Self {
        OfferflowError::Internal(err.to_string())
    }
}
