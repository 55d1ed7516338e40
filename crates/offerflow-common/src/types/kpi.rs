//! KPI report types
//!
//! Ratios use a defined zero for zero denominators, never NaN.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::arm::ArmId;
use super::offer::OfferId;
use crate::error::ValidationError;

/// Inclusive range of calendar days (UTC). `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::MalformedDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Re-check `start <= end`
    pub fn validate(&self) -> Result<(), ValidationError> {
        DateRange::new(self.start, self.end).map(|_| ())
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Iterate every day in the range
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// One arm/offer in the top-performers list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPerformer {
    pub arm_id: ArmId,
    pub offer_id: OfferId,
    pub clicks: u64,
    pub conversions: u64,
    pub revenue: Decimal,
    pub epc: Decimal,
}

/// One day of the daily series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyKpi {
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub revenue: Decimal,
}

/// Aggregated KPI report over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    pub range: DateRange,
    pub offer_id: Option<OfferId>,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_conversions: u64,
    /// Pending + confirmed commission from the sale ledger
    pub total_revenue: Decimal,
    pub confirmed_revenue: Decimal,
    pub pending_revenue: Decimal,
    /// Estimated spend from the spend model
    pub spend: Decimal,
    /// conversions / clicks
    pub conversion_rate: f64,
    /// revenue / clicks
    pub epc: Decimal,
    /// (revenue - spend) / spend
    pub roi: f64,
    pub top_performers: Vec<TopPerformer>,
    pub daily_series: Vec<DailyKpi>,
}

/// `numerator / denominator`, zero when the denominator is zero
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Decimal division with a defined zero
pub fn decimal_ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator
        .checked_div(denominator)
        .unwrap_or(Decimal::ZERO)
}
