//! # Offerflow Common
//!
//! Shared types, errors, and the admin audit log for the Offerflow offer
//! allocation engine.
//!
//! ## Core Types
//!
//! - [`Offer`]: normalized monetizable offer from an external network
//! - [`Arm`]: offer variant bound to a content item, with Beta-Bernoulli counters
//! - [`EventWindow`]: promotional calendar window with boost metadata
//! - [`Sale`]: ledger entry with a pending → terminal status state machine
//! - [`VariantMetricsPoint`]: sealed daily per-arm snapshot
//! - [`KpiReport`]: read-side rollup returned to dashboards

pub mod audit;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use audit::{AuditCategory, AuditEvent, AuditLog, AuditSink, MemoryAuditSink};
pub use error::{EntityKind, OfferflowError, Result, ValidationError};
pub use types::{
    arm::{Arm, ArmId, ContentItemId},
    event_window::{BoostMetadata, EventCode, EventWindow, UrgencyLevel},
    kpi::{DailyKpi, DateRange, KpiReport, TopPerformer},
    metrics::VariantMetricsPoint,
    offer::{Offer, OfferId},
    sale::{Sale, SaleStatus, StatusChange, TransitionOutcome},
};

/// Offerflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of arms materialized on cold start
pub const DEFAULT_COLD_START_TOP_N: usize = 3;

/// Conversions required before an arm's own revenue replaces eRPC
pub const DEFAULT_MIN_OBSERVATIONS: u64 = 3;

/// Default number of entries in the top-performers list
pub const DEFAULT_TOP_K: usize = 10;

/// Default settlement currency
pub const DEFAULT_CURRENCY: &str = "JPY";

/// Milliseconds per day
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// UTC calendar day of a Unix-millis timestamp
pub fn day_of(timestamp_ms: i64) -> chrono::NaiveDate {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .date_naive()
}
