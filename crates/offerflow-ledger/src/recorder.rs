//! Outcome recorder
//!
//! The only writer of arm counters and the sale ledger. Clicks are not
//! idempotent. Sales are idempotent on the upstream order id when one is
//! supplied; without it every call records a new sale.

use std::sync::Arc;

use offerflow_allocator::ArmStore;
use offerflow_common::{
    Arm, ArmId, OfferflowError, Result, Sale, SaleStatus, ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::ledger::{SaleLedger, SaleRecord, StatusUpdate};
use crate::metering::DailyRollup;

/// Normalized conversion from a network webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub arm_id: ArmId,
    /// Order amount (minor units)
    pub amount: Decimal,
    /// Commission earned (minor units)
    pub commission: Decimal,
    /// Source channel
    pub source: String,
    /// Upstream order id
    #[serde(default)]
    pub external_order_id: Option<String>,
    /// Currency override; the recorder default applies when absent
    #[serde(default)]
    pub currency: Option<String>,
    /// Sale timestamp (Unix millis)
    pub occurred_at: i64,
}

impl ConversionEvent {
    /// Create a conversion stamped now
    pub fn new(arm_id: ArmId, amount: Decimal, commission: Decimal, source: impl Into<String>) -> Self {
        Self {
            arm_id,
            amount,
            commission,
            source: source.into(),
            external_order_id: None,
            currency: None,
            occurred_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Set upstream order id
    pub fn with_external_order_id(mut self, external_order_id: impl Into<String>) -> Self {
        self.external_order_id = Some(external_order_id.into());
        self
    }

    /// Set currency
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set sale timestamp
    pub fn at(mut self, occurred_at: i64) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Reject negative money and blank order ids
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.amount < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount(self.amount.to_string()));
        }
        if self.commission < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount(self.commission.to_string()));
        }
        if matches!(&self.external_order_id, Some(id) if id.trim().is_empty()) {
            return Err(ValidationError::MissingField("external_order_id"));
        }
        Ok(())
    }
}

/// Outcome recorder
pub struct OutcomeRecorder {
    store: Arc<dyn ArmStore>,
    ledger: Arc<SaleLedger>,
    rollup: Arc<DailyRollup>,
    default_currency: String,
}

impl OutcomeRecorder {
    pub fn new(
        store: Arc<dyn ArmStore>,
        ledger: Arc<SaleLedger>,
        rollup: Arc<DailyRollup>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            rollup,
            default_currency: default_currency.into(),
        }
    }

    /// Count a click on an arm
    #[instrument(skip(self))]
    pub async fn record_click(&self, arm_id: ArmId, source: &str, at: i64) -> Result<Arm> {
        let arm = self.store.record_click(arm_id).await?;
        self.rollup.record_click(arm_id, at);
        Ok(arm)
    }

    /// Count an impression. Feeds daily metrics only, never arm counters.
    pub async fn record_impression(&self, arm_id: ArmId, at: i64) -> Result<()> {
        if self.store.get_arm(arm_id).await.is_none() {
            return Err(OfferflowError::arm_not_found(arm_id));
        }
        self.rollup.record_impression(arm_id, at);
        Ok(())
    }

    /// Record a sale and credit its commission to the arm.
    ///
    /// A replayed upstream order id returns the original sale as
    /// [`SaleRecord::Duplicate`] and leaves the arm untouched.
    #[instrument(skip(self, event), fields(arm_id = %event.arm_id, external_order_id = ?event.external_order_id))]
    pub async fn record_sale(&self, event: ConversionEvent) -> Result<SaleRecord> {
        event.validate()?;

        let arm = self
            .store
            .get_arm(event.arm_id)
            .await
            .ok_or_else(|| OfferflowError::arm_not_found(event.arm_id))?;

        if let Some(existing) = event
            .external_order_id
            .as_deref()
            .and_then(|id| self.ledger.find_by_external(id))
        {
            debug!(sale_id = %existing.id, "Replayed sale returned without side effects");
            return Ok(SaleRecord::Duplicate(existing));
        }
        // Refuse before the ledger write so a sale never outlives its arm credit
        arm.revenue_after(event.commission)?;

        let sale = Sale::new(
            arm.id,
            arm.offer_id.clone(),
            event.amount,
            event.commission,
            event
                .currency
                .unwrap_or_else(|| self.default_currency.clone()),
            event.source,
            event.external_order_id,
            event.occurred_at,
        );

        let record = self.ledger.record(sale)?;
        match &record {
            SaleRecord::Created(sale) => {
                self.store
                    .record_conversion(sale.arm_id, sale.commission)
                    .await?;
                self.rollup
                    .record_conversion(sale.arm_id, sale.commission, sale.sold_at);
                info!(sale_id = %sale.id, commission = %sale.commission, "Sale recorded");
            }
            SaleRecord::Duplicate(sale) => {
                debug!(sale_id = %sale.id, "Replayed sale returned without side effects");
            }
        }
        Ok(record)
    }

    /// Look up a recorded sale by upstream order id
    pub fn find_sale_by_order(&self, external_order_id: &str) -> Option<Sale> {
        self.ledger.find_by_external(external_order_id)
    }

    /// Apply a status webhook by sale id
    pub fn apply_status(&self, sale_id: Uuid, status: SaleStatus, at: i64) -> Result<StatusUpdate> {
        self.ledger.apply_status(sale_id, status, at)
    }

    /// Apply a status webhook by upstream order id
    pub fn apply_status_by_external(
        &self,
        external_order_id: &str,
        status: SaleStatus,
        at: i64,
    ) -> Result<StatusUpdate> {
        self.ledger
            .apply_status_by_external(external_order_id, status, at)
    }
}
