//! Metering module
//!
//! Daily per-arm counters feeding `VariantMetricsPoint` history.

pub mod rollup;

pub use rollup::DailyRollup;
