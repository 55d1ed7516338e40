//! Spend model for ROI estimation
//!
//! ```text
//! spend = fixed_cost_per_arm × active_arms
//!       + cost_per_click × clicks
//!       + cost_per_impression × impressions
//! roi   = (revenue - spend) / spend
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Estimated cost of running arms, in minor units
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpendModel {
    /// Production/promotion cost charged once per active arm
    pub fixed_cost_per_arm: Decimal,
    pub cost_per_click: Decimal,
    pub cost_per_impression: Decimal,
}

impl SpendModel {
    pub fn estimate(&self, active_arms: u64, clicks: u64, impressions: u64) -> Decimal {
        self.fixed_cost_per_arm
            .saturating_mul(Decimal::from(active_arms))
            .saturating_add(self.cost_per_click.saturating_mul(Decimal::from(clicks)))
            .saturating_add(self.cost_per_impression.saturating_mul(Decimal::from(impressions)))
    }

    /// Return on spend, zero when nothing was spent
    pub fn roi(revenue: Decimal, spend: Decimal) -> f64 {
        if spend.is_zero() {
            return 0.0;
        }
        revenue
            .checked_sub(spend)
            .and_then(|net| net.checked_div(spend))
            .and_then(|r| r.to_f64())
            .unwrap_or(0.0)
    }
}
