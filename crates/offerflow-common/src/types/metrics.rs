//! VariantMetricsPoint - sealed daily snapshot per arm
//!
//! Written once per (arm, date) when a day is closed. Reporting only; the
//! allocator never reads these.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::arm::ArmId;

/// Daily per-arm metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMetricsPoint {
    pub arm_id: ArmId,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    /// Commission revenue (minor units)
    pub revenue: Decimal,
}

impl VariantMetricsPoint {
    /// Empty point for an arm and day
    pub fn empty(arm_id: ArmId, date: NaiveDate) -> Self {
        Self {
            arm_id,
            date,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            revenue: Decimal::ZERO,
        }
    }
}
