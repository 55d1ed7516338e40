//! Arm Store
//!
//! Holds every arm with its Beta-Bernoulli counters. Writes to one arm are
//! serialized by that arm's mutex; writes to different arms never contend.
//! Materialization for a content item is insert-if-absent under the content
//! item's map entry, so concurrent first requests observe a single winner.
//!
//! Lock order is content entry, then arm map, then arm mutex. No path takes
//! them in the opposite direction.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use offerflow_common::{Arm, ArmId, ContentItemId, Offer, OfferId, OfferflowError, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

/// Offer proposed for materialization as an arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmCandidate {
    pub offer_id: OfferId,
    pub creative_ref: String,
}

impl ArmCandidate {
    pub fn new(offer_id: impl Into<OfferId>, creative_ref: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            creative_ref: creative_ref.into(),
        }
    }
}

impl From<&Offer> for ArmCandidate {
    fn from(offer: &Offer) -> Self {
        Self::new(offer.id.clone(), offer.link_url.clone())
    }
}

/// Trait for arm storage backends
#[async_trait]
pub trait ArmStore: Send + Sync {
    /// All arms bound to a content item, enabled and disabled, ascending by id
    async fn get_arms(&self, content_item_id: &str) -> Vec<Arm>;

    /// Get one arm by id
    async fn get_arm(&self, arm_id: ArmId) -> Option<Arm>;

    /// Materialize one arm per candidate offer not yet bound to the content
    /// item. Returns only the arms this call created.
    async fn ensure_arms(&self, content_item_id: &str, candidates: &[ArmCandidate]) -> Vec<Arm>;

    /// Create an arm unconditionally (additional creative for an offer)
    async fn create_arm(
        &self,
        content_item_id: &str,
        offer_id: &str,
        creative_ref: &str,
    ) -> Result<Arm>;

    /// Count one click on an arm
    async fn record_click(&self, arm_id: ArmId) -> Result<Arm>;

    /// Count one conversion and its revenue on an arm
    async fn record_conversion(&self, arm_id: ArmId, revenue: Decimal) -> Result<Arm>;

    /// Enable or disable an arm
    async fn set_enabled(&self, arm_id: ArmId, enabled: bool) -> Result<Arm>;

    /// Zero an arm's counters. Returns the arm as it was before the reset.
    async fn reset_counters(&self, arm_id: ArmId) -> Result<Arm>;

    /// Every arm in the store, ascending by id
    async fn all_arms(&self) -> Vec<Arm>;

    /// Total arm count
    async fn arm_count(&self) -> usize;
}

/// In-memory arm store
///
/// Uses DashMap for concurrent access with a mutex per arm.
pub struct InMemoryArmStore {
    /// All arms by id
    arms: DashMap<ArmId, Arc<Mutex<Arm>>>,

    /// Arm ids by content item, in creation order
    by_content: DashMap<ContentItemId, Vec<ArmId>>,

    /// Next arm id
    next_id: AtomicU64,
}

impl InMemoryArmStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            arms: DashMap::new(),
            by_content: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ArmId {
        ArmId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Clone the arm handle out of the map so the shard lock is released
    /// before the arm mutex is taken.
    fn handle(&self, arm_id: ArmId) -> Result<Arc<Mutex<Arm>>> {
        self.arms
            .get(&arm_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OfferflowError::arm_not_found(arm_id))
    }

    fn update<F>(&self, arm_id: ArmId, f: F) -> Result<Arm>
    where
        F: FnOnce(&mut Arm) -> Result<()>,
    {
        let handle = self.handle(arm_id)?;
        let mut arm = handle.lock();
        f(&mut arm)?;
        Ok(arm.clone())
    }

    fn snapshot(&self, ids: &[ArmId]) -> Vec<Arm> {
        let mut arms: Vec<Arm> = ids
            .iter()
            .filter_map(|id| self.handle(*id).ok())
            .map(|handle| handle.lock().clone())
            .collect();
        arms.sort_by_key(|a| a.id);
        arms
    }
}

impl Default for InMemoryArmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArmStore for InMemoryArmStore {
    async fn get_arms(&self, content_item_id: &str) -> Vec<Arm> {
        let ids = match self.by_content.get(content_item_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        self.snapshot(&ids)
    }

    async fn get_arm(&self, arm_id: ArmId) -> Option<Arm> {
        self.handle(arm_id).ok().map(|handle| handle.lock().clone())
    }

    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    async fn ensure_arms(&self, content_item_id: &str, candidates: &[ArmCandidate]) -> Vec<Arm> {
        let mut ids = self
            .by_content
            .entry(content_item_id.to_string())
            .or_default();

        let mut bound: HashSet<OfferId> = ids
            .iter()
            .filter_map(|id| self.handle(*id).ok())
            .map(|handle| handle.lock().offer_id.clone())
            .collect();

        let mut created = Vec::new();
        for candidate in candidates {
            if !bound.insert(candidate.offer_id.clone()) {
                continue;
            }
            let arm = Arm::new(
                self.allocate_id(),
                content_item_id,
                candidate.offer_id.clone(),
                candidate.creative_ref.clone(),
            );
            self.arms.insert(arm.id, Arc::new(Mutex::new(arm.clone())));
            ids.push(arm.id);
            created.push(arm);
        }

        if !created.is_empty() {
            info!(
                content_item_id,
                created = created.len(),
                "Materialized arms"
            );
        }
        created
    }

    #[instrument(skip(self))]
    async fn create_arm(
        &self,
        content_item_id: &str,
        offer_id: &str,
        creative_ref: &str,
    ) -> Result<Arm> {
        if offer_id.is_empty() {
            return Err(offerflow_common::ValidationError::MissingField("offer_id").into());
        }

        let mut ids = self
            .by_content
            .entry(content_item_id.to_string())
            .or_default();
        let arm = Arm::new(self.allocate_id(), content_item_id, offer_id, creative_ref);
        self.arms.insert(arm.id, Arc::new(Mutex::new(arm.clone())));
        ids.push(arm.id);

        info!(arm_id = %arm.id, content_item_id, offer_id, "Created arm");
        Ok(arm)
    }

    async fn record_click(&self, arm_id: ArmId) -> Result<Arm> {
        let arm = self.update(arm_id, |arm| {
            arm.apply_click();
            Ok(())
        })?;
        debug!(arm_id = %arm_id, clicks = arm.clicks, "Recorded click");
        Ok(arm)
    }

    async fn record_conversion(&self, arm_id: ArmId, revenue: Decimal) -> Result<Arm> {
        let arm = self.update(arm_id, |arm| Ok(arm.apply_conversion(revenue)?))?;
        debug!(arm_id = %arm_id, successes = arm.successes, revenue = %arm.revenue, "Recorded conversion");
        Ok(arm)
    }

    #[instrument(skip(self))]
    async fn set_enabled(&self, arm_id: ArmId, enabled: bool) -> Result<Arm> {
        self.update(arm_id, |arm| {
            arm.set_enabled(enabled);
            Ok(())
        })
    }

    #[instrument(skip(self))]
    async fn reset_counters(&self, arm_id: ArmId) -> Result<Arm> {
        let handle = self.handle(arm_id)?;
        let mut arm = handle.lock();
        let before = arm.clone();
        arm.reset_counters();
        Ok(before)
    }

    async fn all_arms(&self) -> Vec<Arm> {
        let ids: Vec<ArmId> = self.arms.iter().map(|entry| *entry.key()).collect();
        self.snapshot(&ids)
    }

    async fn arm_count(&self) -> usize {
        self.arms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn candidates(ids: &[&str]) -> Vec<ArmCandidate> {
        ids.iter().map(|id| ArmCandidate::new(*id, format!("https://x/{}", id))).collect()
    }

    #[tokio::test]
    async fn test_ensure_arms_is_idempotent() {
        let store = InMemoryArmStore::new();

        let created = store.ensure_arms("post-1", &candidates(&["a", "b"])).await;
        assert_eq!(created.len(), 2);

        let again = store.ensure_arms("post-1", &candidates(&["a", "b", "c"])).await;
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].offer_id, "c");

        let arms = store.get_arms("post-1").await;
        let offers: Vec<&str> = arms.iter().map(|a| a.offer_id.as_str()).collect();
        assert_eq!(offers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_ensure_arms_dedupes_within_batch() {
        let store = InMemoryArmStore::new();
        let created = store.ensure_arms("post-1", &candidates(&["a", "a"])).await;
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_content_items_are_independent() {
        let store = InMemoryArmStore::new();
        store.ensure_arms("post-1", &candidates(&["a"])).await;
        store.ensure_arms("post-2", &candidates(&["a"])).await;

        assert_eq!(store.arm_count().await, 2);
        assert!(store.get_arms("post-3").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_ensure_materializes_once() {
        let store = Arc::new(InMemoryArmStore::new());
        let offers = candidates(&["a", "b", "c"]);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = Arc::clone(&store);
                let offers = offers.clone();
                tokio::spawn(async move { store.ensure_arms("post-new", &offers).await.len() })
            })
            .collect();

        let mut total_created = 0;
        for handle in handles {
            total_created += handle.await.unwrap();
        }

        assert_eq!(total_created, 3);
        assert_eq!(store.get_arms("post-new").await.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_arm_is_not_found() {
        let store = InMemoryArmStore::new();
        let err = store.record_click(ArmId(99)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.record_conversion(ArmId(99), dec!(1)).await.is_err());
        assert!(store.get_arm(ArmId(99)).await.is_none());
    }

    #[tokio::test]
    async fn test_counters_and_disable() {
        let store = InMemoryArmStore::new();
        let arm = store.create_arm("post-1", "a", "caption").await.unwrap();

        store.record_click(arm.id).await.unwrap();
        let updated = store.record_conversion(arm.id, dec!(250)).await.unwrap();
        assert_eq!(updated.clicks, 1);
        assert_eq!(updated.failures, 1);
        assert_eq!(updated.successes, 1);
        assert_eq!(updated.revenue, dec!(250));

        let disabled = store.set_enabled(arm.id, false).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.successes, 1);
        assert_eq!(store.get_arms("post-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_arm_allows_second_creative() {
        let store = InMemoryArmStore::new();
        store.ensure_arms("post-1", &candidates(&["a"])).await;
        store.create_arm("post-1", "a", "alt caption").await.unwrap();

        assert_eq!(store.get_arms("post-1").await.len(), 2);
        assert!(store.create_arm("post-1", "", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_returns_previous_state() {
        let store = InMemoryArmStore::new();
        let arm = store.create_arm("post-1", "a", "").await.unwrap();
        store.record_click(arm.id).await.unwrap();

        let before = store.reset_counters(arm.id).await.unwrap();
        assert_eq!(before.clicks, 1);
        assert_eq!(store.get_arm(arm.id).await.unwrap().clicks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clicks_are_not_lost() {
        let store = Arc::new(InMemoryArmStore::new());
        let arm_id = store.create_arm("post-1", "a", "").await.unwrap().id;

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record_click(arm_id).await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get_arm(arm_id).await.unwrap().clicks, 200);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Click,
        Conversion(u32),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            Just(Event::Click),
            (0u32..100_000).prop_map(Event::Conversion),
        ]
    }

    proptest! {
        #[test]
        fn prop_counters_never_decrease(events in prop::collection::vec(event(), 1..64)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryArmStore::new();
                let arm = store.create_arm("post-1", "a", "").await.unwrap();
                let mut prev = arm.clone();

                for event in events {
                    let next = match event {
                        Event::Click => store.record_click(arm.id).await.unwrap(),
                        Event::Conversion(amount) => store
                            .record_conversion(arm.id, Decimal::from(amount))
                            .await
                            .unwrap(),
                    };
                    assert!(next.successes >= prev.successes);
                    assert!(next.failures >= prev.failures);
                    assert!(next.clicks >= prev.clicks);
                    assert!(next.revenue >= prev.revenue);
                    prev = next;
                }
            });
        }
    }
}
