//! Daily per-arm rollup with DashMap
//!
//! Impressions, clicks and conversions accumulate in open buckets keyed by
//! (arm, UTC day). Closing a day seals its buckets into write-once
//! [`VariantMetricsPoint`]s.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use offerflow_common::{day_of, ArmId, DateRange, VariantMetricsPoint};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

type BucketKey = (ArmId, NaiveDate);

/// Daily metrics rollup
pub struct DailyRollup {
    /// Interval between background day closes (milliseconds)
    close_interval_ms: u64,
    /// Buckets still accepting events
    open: DashMap<BucketKey, VariantMetricsPoint>,
    /// Sealed points, never rewritten
    sealed: DashMap<BucketKey, VariantMetricsPoint>,
}

impl DailyRollup {
    pub fn new(close_interval_ms: u64) -> Self {
        Self {
            close_interval_ms,
            open: DashMap::new(),
            sealed: DashMap::new(),
        }
    }

    /// Close finished days once an hour
    pub fn hourly() -> Self {
        Self::new(3_600_000)
    }

    pub fn record_impression(&self, arm_id: ArmId, at: i64) {
        self.bump(arm_id, at, |p| p.impressions += 1);
    }

    pub fn record_click(&self, arm_id: ArmId, at: i64) {
        self.bump(arm_id, at, |p| p.clicks += 1);
    }

    pub fn record_conversion(&self, arm_id: ArmId, revenue: Decimal, at: i64) {
        self.bump(arm_id, at, |p| {
            p.conversions += 1;
            p.revenue = p.revenue.saturating_add(revenue);
        });
    }

    fn bump<F>(&self, arm_id: ArmId, at: i64, f: F)
    where
        F: FnOnce(&mut VariantMetricsPoint),
    {
        let key = (arm_id, day_of(at));
        // Lock order is open entry, then sealed. Sealing removes the open
        // bucket under the same entry lock, so an occupied bucket is unsealed.
        match self.open.entry(key) {
            Entry::Occupied(mut entry) => f(entry.get_mut()),
            Entry::Vacant(slot) => {
                if self.sealed.contains_key(&key) {
                    warn!(arm_id = %arm_id, date = %key.1, "Late event for sealed day dropped from metrics");
                    return;
                }
                let mut point = VariantMetricsPoint::empty(arm_id, key.1);
                f(&mut point);
                slot.insert(point);
            }
        }
    }

    /// Seal every open bucket dated on or before `through`.
    ///
    /// A bucket whose (arm, day) is already sealed is discarded with a
    /// warning; sealed points are write-once.
    #[instrument(skip(self))]
    pub fn close_through(&self, through: NaiveDate) -> Vec<VariantMetricsPoint> {
        let mut closed = Vec::new();

        self.open.retain(|key, point| {
            if key.1 > through {
                return true;
            }
            match self.sealed.entry(*key) {
                Entry::Occupied(_) => {
                    warn!(arm_id = %key.0, date = %key.1, "Metrics point already sealed; ignoring");
                }
                Entry::Vacant(slot) => {
                    slot.insert(point.clone());
                    closed.push(point.clone());
                }
            }
            false
        });

        closed.sort_by_key(|p| (p.date, p.arm_id));
        if !closed.is_empty() {
            info!(closed = closed.len(), %through, "Sealed daily metrics");
        }
        closed
    }

    /// Seal one day
    pub fn close_day(&self, date: NaiveDate) -> Vec<VariantMetricsPoint> {
        let mut closed = Vec::new();
        let keys: Vec<BucketKey> = self
            .open
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| key.1 == date)
            .collect();

        for key in keys {
            let Entry::Occupied(entry) = self.open.entry(key) else {
                continue;
            };
            match self.sealed.entry(key) {
                Entry::Occupied(_) => {
                    warn!(arm_id = %key.0, date = %key.1, "Metrics point already sealed; ignoring");
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.get().clone());
                    closed.push(entry.get().clone());
                }
            }
            entry.remove();
        }

        closed.sort_by_key(|p| p.arm_id);
        debug!(%date, closed = closed.len(), "Closed day");
        closed
    }

    /// Sealed point for one arm and day
    pub fn sealed_point(&self, arm_id: ArmId, date: NaiveDate) -> Option<VariantMetricsPoint> {
        self.sealed.get(&(arm_id, date)).map(|p| p.clone())
    }

    /// Sealed and open points dated within `range`, by date then arm.
    /// Open points are provisional until their day is closed.
    pub fn points_in(&self, range: &DateRange) -> Vec<VariantMetricsPoint> {
        let mut points = Self::collect_in(&self.sealed, range);
        points.extend(Self::collect_in(&self.open, range));
        points.sort_by_key(|p| (p.date, p.arm_id));
        points
    }

    fn collect_in(
        buckets: &DashMap<BucketKey, VariantMetricsPoint>,
        range: &DateRange,
    ) -> Vec<VariantMetricsPoint> {
        buckets
            .iter()
            .filter(|entry| range.contains(entry.key().1))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    pub fn sealed_len(&self) -> usize {
        self.sealed.len()
    }

    /// Start background day closer. Each tick seals every day before today.
    pub fn start_day_closer(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_millis(self.close_interval_ms));

            loop {
                interval.tick().await;
                let today = day_of(chrono::Utc::now().timestamp_millis());
                if let Some(yesterday) = today.pred_opt() {
                    let closed = self.close_through(yesterday);
                    if !closed.is_empty() {
                        debug!(count = closed.len(), "Day closer sealed points");
                    }
                }
            }
        })
    }
}

impl Default for DailyRollup {
    fn default() -> Self {
        Self::hourly()
    }
}
