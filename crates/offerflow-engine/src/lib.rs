//! # Offerflow Engine
//!
//! Facade over the allocator and ledger exposed to the content-serving layer.
//!
//! ## Operations
//!
//! | Operation | Result |
//! |---|---|
//! | `select_offer` | learned arm, eRPC suggestion, or `NotFound` |
//! | `record_click` | updated arm, or `NotFound` |
//! | `record_conversion` | created or replayed sale, or `NotFound` |
//! | `apply_sale_status` | sale with transition outcome |
//! | `get_kpis` | KPI report over a date range |
//!
//! Collaborators push offers and event windows in through `refresh_offers`
//! and `refresh_event_windows`. Administrative arm changes are written to
//! the audit log.

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use chrono::NaiveDate;
use offerflow_allocator::{
    ArmStore, BanditAllocator, EventCalendar, InMemoryArmStore, OfferCatalog,
};
use offerflow_common::{
    Arm, ArmId, AuditCategory, AuditLog, DateRange, EventWindow, KpiReport, Offer, OfferflowError,
    Result, Sale, SaleStatus, TransitionOutcome, VariantMetricsPoint,
};
use offerflow_ledger::{DailyRollup, KpiAggregator, OutcomeRecorder, SaleLedger};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use config::EngineConfig;
pub use offerflow_allocator::{AllocatorConfig, ArmSelection, RefreshReport, Selection, Suggestion};
pub use offerflow_ledger::{ConversionEvent, SaleRecord, SpendModel, StatusUpdate};
pub use telemetry::EngineMetrics;

/// Offer allocation engine
pub struct OfferEngine {
    catalog: Arc<OfferCatalog>,
    calendar: Arc<EventCalendar>,
    store: Arc<dyn ArmStore>,
    rollup: Arc<DailyRollup>,
    allocator: BanditAllocator,
    recorder: OutcomeRecorder,
    kpis: KpiAggregator,
    audit: AuditLog,
    metrics: Arc<EngineMetrics>,
}

impl OfferEngine {
    /// Create an engine over an in-memory arm store
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(InMemoryArmStore::new()), AuditLog::new())
    }

    /// Create an engine over a caller-supplied arm store and audit log
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn ArmStore>,
        audit: AuditLog,
    ) -> Result<Self> {
        let metrics = Arc::new(
            EngineMetrics::new().map_err(|e| OfferflowError::Internal(e.to_string()))?,
        );
        if config.metrics.register_default {
            if let Err(e) = metrics.register(prometheus::default_registry()) {
                warn!(error = %e, "Engine metrics not registered with default registry");
            }
        }

        let catalog = Arc::new(OfferCatalog::new());
        let calendar = Arc::new(EventCalendar::new());
        let ledger = Arc::new(SaleLedger::new());
        let rollup = Arc::new(DailyRollup::new(
            config.ledger.day_close_interval_secs.max(1) * 1_000,
        ));

        let allocator = BanditAllocator::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&calendar),
            config.allocator.clone(),
        );
        let recorder = OutcomeRecorder::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&rollup),
            config.ledger.default_currency.clone(),
        );
        let kpis = KpiAggregator::new(
            Arc::clone(&store),
            ledger,
            Arc::clone(&rollup),
            config.spend.clone(),
            config.ledger.top_k,
        );

        Ok(Self {
            catalog,
            calendar,
            store,
            rollup,
            allocator,
            recorder,
            kpis,
            audit,
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // Content-serving operations

    /// Select an offer for a content item now
    pub async fn select_offer(&self, content_item_id: &str, keyword: Option<&str>) -> Result<Selection> {
        self.select_offer_at(content_item_id, keyword, Self::now()).await
    }

    /// Select an offer for a content item at `now` (Unix millis)
    pub async fn select_offer_at(
        &self,
        content_item_id: &str,
        keyword: Option<&str>,
        now: i64,
    ) -> Result<Selection> {
        let timer = self.metrics.selection_duration_seconds.start_timer();
        let result = self.allocator.select(content_item_id, keyword, now).await;
        timer.observe_duration();

        match &result {
            Ok(Selection::Learned(_)) => self.metrics.selections_learned.inc(),
            Ok(Selection::Suggested(_)) => self.metrics.selections_suggested.inc(),
            Err(e) if e.is_not_found() => self.metrics.selections_not_found.inc(),
            Err(_) => {}
        }
        result
    }

    pub async fn record_click(&self, arm_id: ArmId, source: &str) -> Result<Arm> {
        self.record_click_at(arm_id, source, Self::now()).await
    }

    pub async fn record_click_at(&self, arm_id: ArmId, source: &str, at: i64) -> Result<Arm> {
        let arm = self.recorder.record_click(arm_id, source, at).await?;
        self.metrics.clicks_total.inc();
        Ok(arm)
    }

    pub async fn record_impression(&self, arm_id: ArmId) -> Result<()> {
        self.record_impression_at(arm_id, Self::now()).await
    }

    pub async fn record_impression_at(&self, arm_id: ArmId, at: i64) -> Result<()> {
        self.recorder.record_impression(arm_id, at).await?;
        self.metrics.impressions_total.inc();
        Ok(())
    }

    /// Record a conversion. A replayed order id returns the original sale.
    pub async fn record_conversion(&self, event: ConversionEvent) -> Result<SaleRecord> {
        let record = self.recorder.record_sale(event).await?;
        if record.is_duplicate() {
            self.metrics.sales_duplicate.inc();
        } else {
            self.metrics.sales_created.inc();
        }
        Ok(record)
    }

    /// Apply a network status to a sale by id
    pub fn apply_sale_status(&self, sale_id: Uuid, status: SaleStatus) -> Result<StatusUpdate> {
        let update = self.recorder.apply_status(sale_id, status, Self::now())?;
        self.observe_transition(&update);
        Ok(update)
    }

    /// Apply a network status to a sale by upstream order id
    pub fn apply_sale_status_by_order(
        &self,
        external_order_id: &str,
        status: SaleStatus,
    ) -> Result<StatusUpdate> {
        let update = self
            .recorder
            .apply_status_by_external(external_order_id, status, Self::now())?;
        self.observe_transition(&update);
        Ok(update)
    }

    /// Sale recorded under an upstream order id, if any
    pub fn find_sale_by_order(&self, external_order_id: &str) -> Option<Sale> {
        self.recorder.find_sale_by_order(external_order_id)
    }

    fn observe_transition(&self, update: &StatusUpdate) {
        if matches!(update.outcome, TransitionOutcome::AlreadyTerminal { .. }) {
            self.metrics.terminal_transitions_ignored.inc();
        }
    }

    pub async fn get_kpis(&self, range: DateRange, offer_id: Option<&str>) -> Result<KpiReport> {
        self.kpis.get_kpis(range, offer_id).await
    }

    // Collaborator feeds

    /// Replace the offer catalog
    #[instrument(skip(self, offers), fields(count = offers.len()))]
    pub fn refresh_offers(&self, offers: Vec<Offer>) -> RefreshReport {
        let report = self.catalog.replace(offers);
        self.audit.log_refresh(
            AuditCategory::CatalogRefresh,
            "offer-adapter",
            report.accepted,
            report.rejected,
        );
        report
    }

    /// Replace the event calendar. A malformed window rejects the batch.
    #[instrument(skip(self, windows), fields(count = windows.len()))]
    pub fn refresh_event_windows(&self, windows: Vec<EventWindow>) -> Result<usize> {
        let count = windows.len();
        match self.calendar.replace(windows) {
            Ok(accepted) => {
                self.audit
                    .log_refresh(AuditCategory::CalendarRefresh, "calendar-job", accepted, 0);
                Ok(accepted)
            }
            Err(e) => {
                self.audit
                    .log_refresh(AuditCategory::CalendarRefresh, "calendar-job", 0, count);
                Err(e)
            }
        }
    }

    /// Windows starting within `horizon_ms` from now
    pub fn upcoming_events(&self, horizon_ms: i64) -> Vec<EventWindow> {
        self.calendar.upcoming(Self::now(), horizon_ms)
    }

    // Arm administration

    pub async fn get_arms(&self, content_item_id: &str) -> Vec<Arm> {
        self.store.get_arms(content_item_id).await
    }

    pub async fn get_arm(&self, arm_id: ArmId) -> Option<Arm> {
        self.store.get_arm(arm_id).await
    }

    /// Bind an additional creative for an offer to a content item
    pub async fn create_arm(
        &self,
        content_item_id: &str,
        offer_id: &str,
        creative_ref: &str,
    ) -> Result<Arm> {
        self.store
            .create_arm(content_item_id, offer_id, creative_ref)
            .await
    }

    /// Enable or disable an arm. History is kept either way.
    pub async fn set_arm_enabled(&self, arm_id: ArmId, enabled: bool, actor: &str) -> Result<Arm> {
        let arm = self.store.set_enabled(arm_id, enabled).await?;
        self.audit.log_arm_state(actor, arm_id, enabled);
        Ok(arm)
    }

    pub async fn disable_arm(&self, arm_id: ArmId, actor: &str) -> Result<Arm> {
        self.set_arm_enabled(arm_id, false, actor).await
    }

    /// Zero an arm's counters. The only operation that lowers them.
    #[instrument(skip(self))]
    pub async fn reset_arm(&self, arm_id: ArmId, actor: &str, reason: &str) -> Result<Arm> {
        if reason.trim().is_empty() {
            return Err(offerflow_common::ValidationError::MissingField("reason").into());
        }
        let before = self.store.reset_counters(arm_id).await?;
        self.audit.log_counter_reset(actor, &before, reason);
        info!(arm_id = %arm_id, actor, "Arm counters reset");

        self.store
            .get_arm(arm_id)
            .await
            .ok_or_else(|| OfferflowError::arm_not_found(arm_id))
    }

    // Metrics lifecycle

    /// Seal daily metrics for one day
    pub fn close_day(&self, date: NaiveDate) -> Vec<VariantMetricsPoint> {
        self.rollup.close_day(date)
    }

    /// Start the background day closer
    pub fn start_day_closer(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.rollup).start_day_closer()
    }
}
