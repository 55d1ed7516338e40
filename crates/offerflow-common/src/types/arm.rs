//! Arm - an offer variant bound to one content item
//!
//! Each arm carries the running counters of a Beta-Bernoulli conversion model:
//! - `successes` (α): conversions attributed to the arm
//! - `failures` (β): clicks observed on the arm (each click is a trial)
//!
//! Counters only grow. The single exception is an audited administrative
//! reset, which goes through [`Arm::reset_counters`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::offer::OfferId;
use crate::error::ValidationError;

/// Content item identifier (published article, video, post)
pub type ContentItemId = String;

/// Arm identifier, allocated sequentially by the arm store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmId(pub u64);

impl std::fmt::Display for ArmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "arm-{}", self.0)
    }
}

/// Offer variant with learned statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    /// Arm ID
    pub id: ArmId,

    /// Content item the arm is bound to
    pub content_item_id: ContentItemId,

    /// Offer this arm promotes
    pub offer_id: OfferId,

    /// Caption/creative reference (opaque to the core)
    pub creative_ref: String,

    /// Disabled arms are never sampled but keep their history
    pub enabled: bool,

    /// α: conversions
    pub successes: u64,

    /// β: clicks
    pub failures: u64,

    /// Cumulative clicks
    pub clicks: u64,

    /// Cumulative commission revenue (minor units)
    pub revenue: Decimal,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last counter update (Unix milliseconds)
    pub updated_at: i64,

    /// Incremented on every mutation
    pub version: u64,
}

impl Arm {
    /// Create a fresh arm with zeroed counters
    pub fn new(
        id: ArmId,
        content_item_id: impl Into<ContentItemId>,
        offer_id: impl Into<OfferId>,
        creative_ref: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            content_item_id: content_item_id.into(),
            offer_id: offer_id.into(),
            creative_ref: creative_ref.into(),
            enabled: true,
            successes: 0,
            failures: 0,
            clicks: 0,
            revenue: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Count a click as one Bernoulli trial
    pub fn apply_click(&mut self) {
        self.clicks += 1;
        self.failures += 1;
        self.touch();
    }

    /// Count a conversion and add its revenue. On error the arm is unchanged.
    pub fn apply_conversion(&mut self, revenue: Decimal) -> Result<(), ValidationError> {
        let total = self.revenue_after(revenue)?;
        self.successes += 1;
        self.revenue = total;
        self.touch();
        Ok(())
    }

    /// Cumulative revenue after crediting `revenue`, without applying it
    pub fn revenue_after(&self, revenue: Decimal) -> Result<Decimal, ValidationError> {
        if revenue < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount(revenue.to_string()));
        }
        self.revenue
            .checked_add(revenue)
            .ok_or_else(|| ValidationError::RevenueOverflow {
                arm_id: self.id.to_string(),
                amount: revenue.to_string(),
            })
    }

    /// Zero all counters. Only reachable through the audited admin path.
    pub fn reset_counters(&mut self) {
        self.successes = 0;
        self.failures = 0;
        self.clicks = 0;
        self.revenue = Decimal::ZERO;
        self.touch();
    }

    /// Enable or disable the arm
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.touch();
    }

    /// Empirical revenue per conversion, if any conversion was observed
    pub fn revenue_per_conversion(&self) -> Option<Decimal> {
        if self.successes == 0 {
            return None;
        }
        Some(self.revenue / Decimal::from(self.successes))
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl std::fmt::Display for Arm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Arm({}, content={}, offer={}, α={}, β={}, revenue={})",
            self.id, self.content_item_id, self.offer_id, self.successes, self.failures, self.revenue
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_arm() {
        let arm = Arm::new(ArmId(1), "post-1", "offer-a", "caption-a");
        assert!(arm.enabled);
        assert_eq!(arm.successes, 0);
        assert_eq!(arm.failures, 0);
        assert_eq!(arm.revenue, Decimal::ZERO);
        assert!(arm.revenue_per_conversion().is_none());
    }

    #[test]
    fn test_counters() {
        let mut arm = Arm::new(ArmId(1), "post-1", "offer-a", "");
        arm.apply_click();
        arm.apply_click();
        arm.apply_conversion(dec!(300)).unwrap();
        arm.apply_conversion(dec!(100)).unwrap();

        assert_eq!(arm.clicks, 2);
        assert_eq!(arm.failures, 2);
        assert_eq!(arm.successes, 2);
        assert_eq!(arm.revenue_per_conversion(), Some(dec!(200)));
        assert_eq!(arm.version, 4);
    }

    #[test]
    fn test_negative_revenue_rejected() {
        let mut arm = Arm::new(ArmId(1), "post-1", "offer-a", "");
        assert!(arm.apply_conversion(dec!(-1)).is_err());
        assert_eq!(arm.successes, 0);
    }

    #[test]
    fn test_revenue_overflow_leaves_arm_unchanged() {
        let mut arm = Arm::new(ArmId(3), "post-1", "offer-a", "");
        arm.apply_conversion(Decimal::MAX).unwrap();
        let version = arm.version;

        let err = arm.apply_conversion(dec!(1)).unwrap_err();
        assert!(matches!(err, ValidationError::RevenueOverflow { .. }));
        assert_eq!(arm.successes, 1);
        assert_eq!(arm.revenue, Decimal::MAX);
        assert_eq!(arm.version, version);
    }

    #[test]
    fn test_reset() {
        let mut arm = Arm::new(ArmId(7), "post-1", "offer-a", "");
        arm.apply_click();
        arm.apply_conversion(dec!(50)).unwrap();
        arm.reset_counters();
        assert_eq!(arm.clicks, 0);
        assert_eq!(arm.successes, 0);
        assert_eq!(arm.revenue, Decimal::ZERO);
        assert_eq!(arm.id.to_string(), "arm-7");
    }
}
