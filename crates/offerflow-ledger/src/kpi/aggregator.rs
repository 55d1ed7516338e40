//! KPI aggregation
//!
//! Read-only. Traffic counts come from the daily rollup; every revenue
//! figure comes from a consistent snapshot of the sale ledger. Money sums
//! saturate at `Decimal::MAX`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use offerflow_allocator::ArmStore;
use offerflow_common::types::kpi::{decimal_ratio, ratio};
use offerflow_common::{
    day_of, ArmId, DailyKpi, DateRange, KpiReport, OfferId, Result, SaleStatus, TopPerformer,
};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::spend::SpendModel;
use crate::ledger::SaleLedger;
use crate::metering::DailyRollup;

#[derive(Debug, Default, Clone)]
struct Tally {
    impressions: u64,
    clicks: u64,
    conversions: u64,
    revenue: Decimal,
}

/// KPI aggregator
pub struct KpiAggregator {
    store: Arc<dyn ArmStore>,
    ledger: Arc<SaleLedger>,
    rollup: Arc<DailyRollup>,
    spend: SpendModel,
    top_k: usize,
}

impl KpiAggregator {
    pub fn new(
        store: Arc<dyn ArmStore>,
        ledger: Arc<SaleLedger>,
        rollup: Arc<DailyRollup>,
        spend: SpendModel,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            rollup,
            spend,
            top_k,
        }
    }

    /// Build a KPI report over `range`, optionally limited to one offer.
    ///
    /// Missing data yields zeroed aggregates. An inverted range is
    /// `InvalidInput`.
    #[instrument(skip(self))]
    pub async fn get_kpis(&self, range: DateRange, offer_id: Option<&str>) -> Result<KpiReport> {
        range.validate()?;

        let arms = self.store.all_arms().await;
        let arm_offers: HashMap<ArmId, OfferId> = arms
            .iter()
            .filter(|a| offer_id.map_or(true, |o| a.offer_id == o))
            .map(|a| (a.id, a.offer_id.clone()))
            .collect();
        let active_arms = arms
            .iter()
            .filter(|a| a.enabled && arm_offers.contains_key(&a.id))
            .count() as u64;

        let mut per_arm: BTreeMap<ArmId, Tally> = BTreeMap::new();
        let mut per_day: BTreeMap<NaiveDate, Tally> =
            range.days().map(|d| (d, Tally::default())).collect();

        for point in self.rollup.points_in(&range) {
            if !arm_offers.contains_key(&point.arm_id) {
                continue;
            }
            let arm = per_arm.entry(point.arm_id).or_default();
            arm.impressions += point.impressions;
            arm.clicks += point.clicks;
            if let Some(day) = per_day.get_mut(&point.date) {
                day.impressions += point.impressions;
                day.clicks += point.clicks;
            }
        }

        let mut confirmed_revenue = Decimal::ZERO;
        let mut pending_revenue = Decimal::ZERO;
        for sale in self.ledger.consistent_snapshot() {
            let date = day_of(sale.sold_at);
            if !range.contains(date) || !sale.status.counts_as_revenue() {
                continue;
            }
            if offer_id.map_or(false, |o| sale.offer_id != o) {
                continue;
            }

            let commission = sale.counted_commission();
            match sale.status {
                SaleStatus::Confirmed => {
                    confirmed_revenue = confirmed_revenue.saturating_add(commission)
                }
                _ => pending_revenue = pending_revenue.saturating_add(commission),
            }
            let arm = per_arm.entry(sale.arm_id).or_default();
            arm.conversions += 1;
            arm.revenue = arm.revenue.saturating_add(commission);
            if let Some(day) = per_day.get_mut(&date) {
                day.conversions += 1;
                day.revenue = day.revenue.saturating_add(commission);
            }
        }

        let total = per_arm.values().fold(Tally::default(), |mut acc, t| {
            acc.impressions += t.impressions;
            acc.clicks += t.clicks;
            acc.conversions += t.conversions;
            acc.revenue = acc.revenue.saturating_add(t.revenue);
            acc
        });

        let spend = self
            .spend
            .estimate(active_arms, total.clicks, total.impressions);

        let mut top_performers: Vec<TopPerformer> = per_arm
            .iter()
            .filter(|(_, t)| t.clicks > 0 || t.conversions > 0)
            .map(|(arm_id, t)| TopPerformer {
                arm_id: *arm_id,
                offer_id: arm_offers.get(arm_id).cloned().unwrap_or_default(),
                clicks: t.clicks,
                conversions: t.conversions,
                revenue: t.revenue,
                epc: decimal_ratio(t.revenue, Decimal::from(t.clicks)),
            })
            .collect();
        // BTreeMap order makes the sort stable on arm id for equal revenue
        top_performers.sort_by(|a, b| b.revenue.cmp(&a.revenue));
        top_performers.truncate(self.top_k);

        let daily_series = per_day
            .into_iter()
            .map(|(date, t)| DailyKpi {
                date,
                impressions: t.impressions,
                clicks: t.clicks,
                conversions: t.conversions,
                revenue: t.revenue,
            })
            .collect();

        debug!(
            clicks = total.clicks,
            conversions = total.conversions,
            revenue = %total.revenue,
            "KPI report built"
        );

        Ok(KpiReport {
            range,
            offer_id: offer_id.map(String::from),
            total_impressions: total.impressions,
            total_clicks: total.clicks,
            total_conversions: total.conversions,
            total_revenue: total.revenue,
            confirmed_revenue,
            pending_revenue,
            spend,
            conversion_rate: ratio(total.conversions, total.clicks),
            epc: decimal_ratio(total.revenue, Decimal::from(total.clicks)),
            roi: SpendModel::roi(total.revenue, spend),
            top_performers,
            daily_series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_allocator::InMemoryArmStore;
    use offerflow_common::Sale;
    use rust_decimal_macros::dec;

    // 2024-01-01T00:00:00Z
    const DAY0: i64 = 1_704_067_200_000;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryArmStore>,
        ledger: Arc<SaleLedger>,
        rollup: Arc<DailyRollup>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryArmStore::new()),
                ledger: Arc::new(SaleLedger::new()),
                rollup: Arc::new(DailyRollup::hourly()),
            }
        }

        fn aggregator(&self, spend: SpendModel) -> KpiAggregator {
            KpiAggregator::new(
                self.store.clone(),
                self.ledger.clone(),
                self.rollup.clone(),
                spend,
                10,
            )
        }

        fn sale(&self, arm_id: ArmId, offer: &str, commission: Decimal, at: i64) -> uuid::Uuid {
            let sale = Sale::new(arm_id, offer, dec!(10000), commission, "JPY", "blog", None, at);
            self.ledger.record(sale).unwrap().into_sale().id
        }
    }

    #[tokio::test]
    async fn test_empty_report_is_zeroed() {
        let fixture = Fixture::new();
        let report = fixture
            .aggregator(SpendModel::default())
            .get_kpis(DateRange::day(date("2024-01-01")), None)
            .await
            .unwrap();

        assert_eq!(report.total_clicks, 0);
        assert_eq!(report.conversion_rate, 0.0);
        assert_eq!(report.epc, Decimal::ZERO);
        assert_eq!(report.roi, 0.0);
        assert_eq!(report.daily_series.len(), 1);
        assert!(report.top_performers.is_empty());
    }

    #[tokio::test]
    async fn test_offer_with_zero_clicks() {
        let fixture = Fixture::new();
        let arm = fixture.store.create_arm("post-1", "A", "").await.unwrap();
        fixture.rollup.record_impression(arm.id, DAY0);

        let report = fixture
            .aggregator(SpendModel::default())
            .get_kpis(DateRange::day(date("2024-01-01")), Some("A"))
            .await
            .unwrap();
        assert_eq!(report.total_impressions, 1);
        assert_eq!(report.conversion_rate, 0.0);
        assert_eq!(report.epc, Decimal::ZERO);
        assert!(!report.conversion_rate.is_nan());
    }

    #[tokio::test]
    async fn test_totals_ratios_and_breakdown() {
        let fixture = Fixture::new();
        let a = fixture.store.create_arm("post-1", "A", "").await.unwrap();
        let b = fixture.store.create_arm("post-1", "B", "").await.unwrap();

        for _ in 0..4 {
            fixture.rollup.record_click(a.id, DAY0);
        }
        fixture.rollup.record_click(b.id, DAY0);

        let confirmed = fixture.sale(a.id, "A", dec!(600), DAY0 + 1);
        fixture.sale(a.id, "A", dec!(200), DAY0 + 2);
        let cancelled = fixture.sale(b.id, "B", dec!(999), DAY0 + 3);
        fixture.ledger.apply_status(confirmed, SaleStatus::Confirmed, DAY0 + 10).unwrap();
        fixture.ledger.apply_status(cancelled, SaleStatus::Cancelled, DAY0 + 10).unwrap();

        let spend = SpendModel {
            cost_per_click: dec!(100),
            ..SpendModel::default()
        };
        let report = fixture
            .aggregator(spend)
            .get_kpis(DateRange::day(date("2024-01-01")), None)
            .await
            .unwrap();

        assert_eq!(report.total_clicks, 5);
        assert_eq!(report.total_conversions, 2);
        assert_eq!(report.total_revenue, dec!(800));
        assert_eq!(report.confirmed_revenue, dec!(600));
        assert_eq!(report.pending_revenue, dec!(200));
        assert_eq!(report.conversion_rate, 0.4);
        assert_eq!(report.epc, dec!(160));
        assert_eq!(report.spend, dec!(500));
        assert!((report.roi - 0.6).abs() < 1e-9);

        assert_eq!(report.top_performers[0].arm_id, a.id);
        assert_eq!(report.top_performers[0].epc, dec!(200));
        assert_eq!(report.top_performers[1].revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_offer_filter_and_date_range() {
        let fixture = Fixture::new();
        let a = fixture.store.create_arm("post-1", "A", "").await.unwrap();
        let b = fixture.store.create_arm("post-2", "B", "").await.unwrap();

        fixture.sale(a.id, "A", dec!(100), DAY0);
        fixture.sale(b.id, "B", dec!(300), DAY0);
        fixture.sale(a.id, "A", dec!(50), DAY0 - 1);

        let range = DateRange::new(date("2024-01-01"), date("2024-01-03")).unwrap();
        let report = fixture
            .aggregator(SpendModel::default())
            .get_kpis(range, Some("A"))
            .await
            .unwrap();

        assert_eq!(report.total_revenue, dec!(100));
        assert_eq!(report.daily_series.len(), 3);
        assert_eq!(report.daily_series[0].revenue, dec!(100));
        assert_eq!(report.daily_series[1].revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_huge_commissions_saturate() {
        let fixture = Fixture::new();
        let a = fixture.store.create_arm("post-1", "A", "").await.unwrap();
        let b = fixture.store.create_arm("post-1", "B", "").await.unwrap();
        fixture.sale(a.id, "A", Decimal::MAX, DAY0);
        fixture.sale(b.id, "B", Decimal::MAX, DAY0);

        let report = fixture
            .aggregator(SpendModel::default())
            .get_kpis(DateRange::day(date("2024-01-01")), None)
            .await
            .unwrap();

        assert_eq!(report.total_conversions, 2);
        assert_eq!(report.total_revenue, Decimal::MAX);
        assert_eq!(report.pending_revenue, Decimal::MAX);
        assert_eq!(report.daily_series[0].revenue, Decimal::MAX);
    }
}
