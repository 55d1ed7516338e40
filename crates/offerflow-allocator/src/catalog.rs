//! Offer catalog
//!
//! Read-mostly snapshot of normalized offers. Network adapters push a full
//! replacement on their own cadence; readers load the current snapshot without
//! locking.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use offerflow_common::{Offer, OfferId};
use tracing::{info, warn};

use crate::erpc::{ErpcRanker, RankedOffer};

/// Immutable catalog snapshot with offers pre-ranked by eRPC
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    offers: HashMap<OfferId, Offer>,
    ranked: Vec<RankedOffer>,
    /// Refresh timestamp (Unix millis)
    pub refreshed_at: i64,
}

impl CatalogSnapshot {
    /// Look up an offer
    pub fn get(&self, offer_id: &str) -> Option<&Offer> {
        self.offers.get(offer_id)
    }

    /// eRPC of an offer, zero if unknown
    pub fn erpc(&self, offer_id: &str) -> f64 {
        self.offers.get(offer_id).map(ErpcRanker::score).unwrap_or(0.0)
    }

    /// Valid offers in eRPC order, optionally filtered by keyword
    pub fn ranked_matching<'a>(
        &'a self,
        keyword: Option<&'a str>,
    ) -> impl Iterator<Item = &'a RankedOffer> + 'a {
        self.ranked
            .iter()
            .filter(move |r| keyword.map_or(true, |k| r.offer.matches_keyword(k)))
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

/// Outcome of a catalog refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Lock-free offer catalog
pub struct OfferCatalog {
    snapshot: ArcSwap<CatalogSnapshot>,
}

impl OfferCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CatalogSnapshot::default()),
        }
    }

    /// Create a catalog from an initial offer list
    pub fn with_offers(offers: Vec<Offer>) -> Self {
        let catalog = Self::new();
        catalog.replace(offers);
        catalog
    }

    /// Replace the whole catalog.
    ///
    /// Invalid offers (negative price/commission) are dropped and counted in
    /// the report; the refresh itself never fails.
    pub fn replace(&self, offers: Vec<Offer>) -> RefreshReport {
        let mut valid = HashMap::with_capacity(offers.len());
        let mut rejected = 0usize;

        for offer in offers {
            match offer.validate() {
                Ok(()) => {
                    valid.insert(offer.id.clone(), offer);
                }
                Err(e) => {
                    warn!(offer_id = %offer.id, error = %e, "Rejected offer in catalog refresh");
                    rejected += 1;
                }
            }
        }

        let list: Vec<Offer> = valid.values().cloned().collect();
        let ranked = ErpcRanker::rank(&list);
        let accepted = valid.len();

        self.snapshot.store(Arc::new(CatalogSnapshot {
            offers: valid,
            ranked,
            refreshed_at: chrono::Utc::now().timestamp_millis(),
        }));

        info!(accepted, rejected, "Offer catalog refreshed");
        RefreshReport { accepted, rejected }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }
}

impl Default for OfferCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_drops_invalid() {
        let catalog = OfferCatalog::new();
        let report = catalog.replace(vec![
            Offer::new("a", "net", 10_000, 500, 0.05),
            Offer::new("bad", "net", -1, 500, 0.05),
        ]);

        assert_eq!(report, RefreshReport { accepted: 1, rejected: 1 });
        let snap = catalog.snapshot();
        assert!(snap.get("a").is_some());
        assert!(snap.get("bad").is_none());
        assert!((snap.erpc("a") - 25.0).abs() < 1e-9);
        assert_eq!(snap.erpc("missing"), 0.0);
    }

    #[test]
    fn test_ranked_matching_filters_keyword() {
        let catalog = OfferCatalog::with_offers(vec![
            Offer::new("cam", "net", 50_000, 300, 0.02).with_category("camera"),
            Offer::new("ear", "net", 5_000, 1_000, 0.08).with_category("audio"),
            Offer::new("mic", "net", 8_000, 800, 0.05).with_category("audio"),
        ]);
        let snap = catalog.snapshot();

        let audio: Vec<&str> = snap
            .ranked_matching(Some("audio"))
            .map(|r| r.offer.id.as_str())
            .collect();
        assert_eq!(audio, vec!["ear", "mic"]);
        assert_eq!(snap.ranked_matching(None).count(), 3);
    }

    #[test]
    fn test_old_snapshot_survives_refresh() {
        let catalog = OfferCatalog::with_offers(vec![Offer::new("a", "net", 1, 1, 0.1)]);
        let before = catalog.snapshot();
        catalog.replace(vec![]);

        assert_eq!(before.len(), 1);
        assert!(catalog.snapshot().is_empty());
    }
}
