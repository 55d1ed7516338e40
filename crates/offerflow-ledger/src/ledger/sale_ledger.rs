//! Sale ledger
//!
//! Authoritative record of commission-bearing conversions. Each sale sits
//! behind its own mutex so status webhooks for different sales never contend.
//!
//! Every write holds the shared side of `gate`; [`SaleLedger::consistent_snapshot`]
//! takes the exclusive side, so financial totals never observe a half-applied
//! write. `gate` is always acquired before any map or sale lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use offerflow_common::{OfferflowError, Result, Sale, SaleStatus, TransitionOutcome};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of inserting a sale
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "sale", rename_all = "snake_case")]
pub enum SaleRecord {
    /// New sale written to the ledger
    Created(Sale),
    /// External order id already recorded; carries the original sale
    Duplicate(Sale),
}

impl SaleRecord {
    pub fn sale(&self) -> &Sale {
        match self {
            SaleRecord::Created(sale) | SaleRecord::Duplicate(sale) => sale,
        }
    }

    pub fn into_sale(self) -> Sale {
        match self {
            SaleRecord::Created(sale) | SaleRecord::Duplicate(sale) => sale,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, SaleRecord::Duplicate(_))
    }
}

/// Sale after a status update, with what happened to it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub sale: Sale,
    pub outcome: TransitionOutcome,
}

/// Concurrent sale ledger
pub struct SaleLedger {
    /// Sales by id
    sales: DashMap<Uuid, Arc<Mutex<Sale>>>,
    /// Idempotency index: upstream order id to sale id
    by_external: DashMap<String, Uuid>,
    gate: RwLock<()>,
}

impl SaleLedger {
    pub fn new() -> Self {
        Self {
            sales: DashMap::new(),
            by_external: DashMap::new(),
            gate: RwLock::new(()),
        }
    }

    /// Insert a sale.
    ///
    /// With an external order id this is insert-if-absent: a replay returns
    /// the original sale untouched. Without one, every call inserts.
    #[instrument(skip(self, sale), fields(sale_id = %sale.id, arm_id = %sale.arm_id))]
    pub fn record(&self, sale: Sale) -> Result<SaleRecord> {
        let _gate = self.gate.read();

        let external = match sale.external_order_id.clone() {
            Some(external) => external,
            None => {
                self.insert(sale.clone());
                debug!("Recorded sale without external order id");
                return Ok(SaleRecord::Created(sale));
            }
        };

        match self.by_external.entry(external) {
            Entry::Occupied(entry) => {
                let existing = self.handle(*entry.get()).map_err(|_| {
                    OfferflowError::Inconsistent(format!(
                        "order {} indexed without a sale",
                        entry.key()
                    ))
                })?;
                let existing = existing.lock().clone();
                debug!(
                    external_order_id = %entry.key(),
                    original = %existing.id,
                    "Duplicate sale ignored"
                );
                Ok(SaleRecord::Duplicate(existing))
            }
            Entry::Vacant(entry) => {
                self.insert(sale.clone());
                entry.insert(sale.id);
                info!(external_order_id = ?sale.external_order_id, "Recorded sale");
                Ok(SaleRecord::Created(sale))
            }
        }
    }

    fn insert(&self, sale: Sale) {
        self.sales.insert(sale.id, Arc::new(Mutex::new(sale)));
    }

    fn handle(&self, sale_id: Uuid) -> Result<Arc<Mutex<Sale>>> {
        self.sales
            .get(&sale_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OfferflowError::sale_not_found(sale_id))
    }

    pub fn get(&self, sale_id: Uuid) -> Option<Sale> {
        self.handle(sale_id).ok().map(|handle| handle.lock().clone())
    }

    pub fn find_by_external(&self, external_order_id: &str) -> Option<Sale> {
        let sale_id = *self.by_external.get(external_order_id)?.value();
        self.get(sale_id)
    }

    /// Apply a webhook status by sale id.
    ///
    /// A transition on a terminal sale is a logged no-op, not an error.
    #[instrument(skip(self))]
    pub fn apply_status(&self, sale_id: Uuid, status: SaleStatus, at: i64) -> Result<StatusUpdate> {
        let _gate = self.gate.read();
        let handle = self.handle(sale_id)?;
        let mut sale = handle.lock();

        let outcome = sale.transition(status, at);
        match outcome {
            TransitionOutcome::Applied => {
                info!(%sale_id, %status, "Sale status updated");
            }
            TransitionOutcome::Unchanged => {
                debug!(%sale_id, %status, "Sale status unchanged");
            }
            TransitionOutcome::AlreadyTerminal { current } => {
                warn!(%sale_id, %current, requested = %status, "Ignored transition on terminal sale");
            }
        }

        Ok(StatusUpdate {
            sale: sale.clone(),
            outcome,
        })
    }

    /// Apply a webhook status by upstream order id
    pub fn apply_status_by_external(
        &self,
        external_order_id: &str,
        status: SaleStatus,
        at: i64,
    ) -> Result<StatusUpdate> {
        let sale_id = self
            .by_external
            .get(external_order_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OfferflowError::sale_not_found(external_order_id))?;
        self.apply_status(sale_id, status, at)
    }

    /// Every sale, read while no write is in flight
    pub fn consistent_snapshot(&self) -> Vec<Sale> {
        let _gate = self.gate.write();
        let mut sales: Vec<Sale> = self
            .sales
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect();
        sales.sort_by_key(|s| s.id);
        sales
    }

    pub fn len(&self) -> usize {
        self.sales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }
}

impl Default for SaleLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_common::ArmId;
    use rust_decimal_macros::dec;

    fn sale(external: Option<&str>) -> Sale {
        Sale::new(
            ArmId(1),
            "offer-a",
            dec!(10000),
            dec!(500),
            "JPY",
            "blog",
            external.map(String::from),
            1_000,
        )
    }

    #[test]
    fn test_duplicate_external_id_returns_original() {
        let ledger = SaleLedger::new();
        let first = ledger.record(sale(Some("order-1"))).unwrap();
        let second = ledger.record(sale(Some("order-1"))).unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(first.sale().id, second.sale().id);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_without_external_id_always_inserts() {
        let ledger = SaleLedger::new();
        ledger.record(sale(None)).unwrap();
        ledger.record(sale(None)).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_terminal_sale_is_immutable() {
        let ledger = SaleLedger::new();
        let id = ledger.record(sale(Some("order-1"))).unwrap().into_sale().id;

        let confirmed = ledger.apply_status(id, SaleStatus::Confirmed, 2_000).unwrap();
        assert_eq!(confirmed.outcome, TransitionOutcome::Applied);

        let cancelled = ledger
            .apply_status_by_external("order-1", SaleStatus::Cancelled, 3_000)
            .unwrap();
        assert_eq!(
            cancelled.outcome,
            TransitionOutcome::AlreadyTerminal {
                current: SaleStatus::Confirmed
            }
        );
        assert_eq!(ledger.get(id).unwrap().status, SaleStatus::Confirmed);
        assert_eq!(ledger.get(id).unwrap().history.len(), 2);
    }

    #[test]
    fn test_unknown_sale_is_not_found() {
        let ledger = SaleLedger::new();
        assert!(ledger
            .apply_status(Uuid::now_v7(), SaleStatus::Confirmed, 0)
            .unwrap_err()
            .is_not_found());
        assert!(ledger
            .apply_status_by_external("missing", SaleStatus::Confirmed, 0)
            .is_err());
        assert!(ledger.find_by_external("missing").is_none());
    }

    #[test]
    fn test_concurrent_duplicate_webhooks() {
        let ledger = Arc::new(SaleLedger::new());
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger.record(sale(Some("order-race"))).unwrap().is_duplicate()
                })
            })
            .collect();

        let created = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|dup| !dup)
            .count();
        assert_eq!(created, 1);
        assert_eq!(ledger.consistent_snapshot().len(), 1);
    }
}
