//! Thompson-sampling allocator over the arms of one content item

use std::sync::Arc;

use offerflow_common::{Arm, ArmId, EventWindow, OfferId, OfferflowError, Result};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::calendar::{boost_in, EventCalendar};
use crate::catalog::{CatalogSnapshot, OfferCatalog};
use crate::sampler::{PosteriorSampler, RngSampler};
use crate::store::{ArmCandidate, ArmStore};
use crate::AllocatorConfig;

/// Arm chosen by Thompson sampling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmSelection {
    pub arm_id: ArmId,
    pub offer_id: OfferId,
    /// Renderable link or creative reference
    pub link_ref: String,
    /// Boosted expected value that won the draw
    pub expected_value: f64,
    /// Sampled conversion probability
    pub sampled_probability: f64,
    /// Event multiplier applied
    pub boost: f64,
}

/// Offer suggested without creating arms
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub offer_id: OfferId,
    pub link_ref: String,
    pub erpc: f64,
}

/// Allocation result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Selection {
    /// Selected with learning: outcomes feed back into the arm
    Learned(ArmSelection),
    /// Suggested from eRPC only; nothing will learn from it
    Suggested(Suggestion),
}

impl Selection {
    pub fn is_learning_backed(&self) -> bool {
        matches!(self, Selection::Learned(_))
    }

    pub fn arm_id(&self) -> Option<ArmId> {
        match self {
            Selection::Learned(s) => Some(s.arm_id),
            Selection::Suggested(_) => None,
        }
    }

    pub fn offer_id(&self) -> &str {
        match self {
            Selection::Learned(s) => &s.offer_id,
            Selection::Suggested(s) => &s.offer_id,
        }
    }

    pub fn link_ref(&self) -> &str {
        match self {
            Selection::Learned(s) => &s.link_ref,
            Selection::Suggested(s) => &s.link_ref,
        }
    }
}

/// Bandit allocator
pub struct BanditAllocator {
    store: Arc<dyn ArmStore>,
    catalog: Arc<OfferCatalog>,
    calendar: Arc<EventCalendar>,
    config: AllocatorConfig,
}

impl BanditAllocator {
    pub fn new(
        store: Arc<dyn ArmStore>,
        catalog: Arc<OfferCatalog>,
        calendar: Arc<EventCalendar>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            calendar,
            config,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Select one offer for a content item at `now` (Unix millis).
    ///
    /// Returns `NotFound` when no enabled arm exists and no catalog offer can
    /// seed one.
    #[instrument(skip(self))]
    pub async fn select(
        &self,
        content_item_id: &str,
        keyword: Option<&str>,
        now: i64,
    ) -> Result<Selection> {
        let catalog = self.catalog.snapshot();
        let mut arms = self.store.get_arms(content_item_id).await;

        if !arms.iter().any(|a| a.enabled) {
            if arms.is_empty() && keyword.is_none() {
                return suggest(content_item_id, &catalog);
            }
            self.materialize(content_item_id, keyword, &arms, &catalog)
                .await;
            arms = self.store.get_arms(content_item_id).await;
        }

        let windows = self.calendar.snapshot();
        let selection = self.draw(&arms, &catalog, &windows, now);

        match selection {
            Some(selection) => {
                debug!(
                    arm_id = %selection.arm_id,
                    offer_id = %selection.offer_id,
                    expected_value = selection.expected_value,
                    boost = selection.boost,
                    "Selected arm"
                );
                Ok(Selection::Learned(selection))
            }
            None => Err(OfferflowError::no_offer(content_item_id)),
        }
    }

    /// Sample once over the snapshot with the configured randomness
    fn draw(
        &self,
        arms: &[Arm],
        catalog: &CatalogSnapshot,
        windows: &[EventWindow],
        now: i64,
    ) -> Option<ArmSelection> {
        let min_observations = self.config.min_observations;
        match self.config.sampler_seed {
            Some(seed) => select_from_snapshot(
                arms,
                catalog,
                windows,
                now,
                min_observations,
                &mut RngSampler::seeded(seed),
            ),
            None => select_from_snapshot(
                arms,
                catalog,
                windows,
                now,
                min_observations,
                &mut RngSampler::new(rand::thread_rng()),
            ),
        }
    }

    /// Seed arms from the eRPC ranking, skipping offers already bound
    async fn materialize(
        &self,
        content_item_id: &str,
        keyword: Option<&str>,
        existing: &[Arm],
        catalog: &CatalogSnapshot,
    ) {
        let candidates: Vec<ArmCandidate> = catalog
            .ranked_matching(keyword)
            .filter(|r| !existing.iter().any(|a| a.offer_id == r.offer.id))
            .take(self.config.cold_start_top_n)
            .map(|r| ArmCandidate::from(&r.offer))
            .collect();

        if candidates.is_empty() {
            debug!(content_item_id, ?keyword, "No cold-start candidates");
            return;
        }

        let created = self.store.ensure_arms(content_item_id, &candidates).await;
        info!(
            content_item_id,
            ?keyword,
            created = created.len(),
            "Cold start"
        );
    }
}

/// Top eRPC offer, with no arms created
fn suggest(content_item_id: &str, catalog: &CatalogSnapshot) -> Result<Selection> {
    let top = catalog
        .ranked_matching(None)
        .next()
        .ok_or_else(|| OfferflowError::no_offer(content_item_id))?;

    debug!(content_item_id, offer_id = %top.offer.id, "Suggestion-only selection");
    Ok(Selection::Suggested(Suggestion {
        offer_id: top.offer.id.clone(),
        link_ref: top.offer.link_url.clone(),
        erpc: top.score,
    }))
}

/// Pure selection over a snapshot of arms, catalog and calendar.
///
/// Arms are visited in ascending id order and a later arm wins only with a
/// strictly greater value, so ties go to the lowest id.
pub fn select_from_snapshot<S: PosteriorSampler + ?Sized>(
    arms: &[Arm],
    catalog: &CatalogSnapshot,
    windows: &[EventWindow],
    now: i64,
    min_observations: u64,
    sampler: &mut S,
) -> Option<ArmSelection> {
    let mut ordered: Vec<&Arm> = arms.iter().filter(|a| a.enabled).collect();
    ordered.sort_by_key(|a| a.id);

    let mut best: Option<ArmSelection> = None;
    for arm in ordered {
        let offer = catalog.get(&arm.offer_id);

        let p = sampler.sample_beta(arm.successes as f64 + 1.0, arm.failures as f64 + 1.0);
        let rpc = if arm.successes >= min_observations {
            arm.revenue_per_conversion()
                .and_then(|r| r.to_f64())
                .unwrap_or(0.0)
        } else {
            catalog.erpc(&arm.offer_id)
        };
        let boost = boost_in(windows, now, offer.map(|o| o.network.as_str())).multiplier;

        let mut value = p * rpc * boost;
        if !value.is_finite() {
            value = 0.0;
        }

        if best.as_ref().map_or(true, |b| value > b.expected_value) {
            let link_ref = if arm.creative_ref.is_empty() {
                offer.map(|o| o.link_url.clone()).unwrap_or_default()
            } else {
                arm.creative_ref.clone()
            };
            best = Some(ArmSelection {
                arm_id: arm.id,
                offer_id: arm.offer_id.clone(),
                link_ref,
                expected_value: value,
                sampled_probability: p,
                boost,
            });
        }
    }
    best
}
