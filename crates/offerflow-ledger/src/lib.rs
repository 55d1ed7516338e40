//! # Offerflow Ledger
//!
//! Outcome recording, the authoritative sale ledger, daily metrics, and KPI
//! rollups.
//!
//! ## Write path
//!
//! ```text
//! click      → arm counters + daily rollup
//! impression → daily rollup
//! sale       → sale ledger (idempotent on order id) → arm revenue + daily rollup
//! status     → sale ledger (pending → confirmed | cancelled | rejected)
//! ```
//!
//! ## Read path
//!
//! KPI reports take traffic from the daily rollup and revenue from a
//! consistent ledger snapshot.

pub mod kpi;
pub mod ledger;
pub mod metering;
pub mod recorder;

pub use kpi::{KpiAggregator, SpendModel};
pub use ledger::{SaleLedger, SaleRecord, StatusUpdate};
pub use metering::DailyRollup;
pub use recorder::{ConversionEvent, OutcomeRecorder};

use offerflow_common::{DEFAULT_CURRENCY, DEFAULT_TOP_K};
use serde::Deserialize;

/// Ledger configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency recorded when a conversion carries none
    pub default_currency: String,
    /// Background day-close interval (seconds)
    pub day_close_interval_secs: u64,
    /// Entries in the top-performers list
    pub top_k: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            day_close_interval_secs: 3_600,
            top_k: DEFAULT_TOP_K,
        }
    }
}
