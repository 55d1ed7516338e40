//! eRPC ranking: score = price × (commission_bps / 10000) × conversion_rate

use std::cmp::Reverse;

use offerflow_common::Offer;
use ordered_float::OrderedFloat;
use tracing::debug;

/// Offer paired with its eRPC score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedOffer {
    pub offer: Offer,
    /// Effective revenue per click, in minor units
    pub score: f64,
}

/// Cold-start ranker for offers without live performance data
pub struct ErpcRanker;

impl ErpcRanker {
    /// Calculate eRPC for a single offer.
    ///
    /// The conversion-rate proxy is clamped to `[0, 1]`; a non-finite proxy
    /// scores zero.
    pub fn score(offer: &Offer) -> f64 {
        let cvr = if offer.conversion_rate.is_finite() {
            offer.conversion_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        offer.commission_per_conversion() * cvr
    }

    /// Rank offers by descending eRPC.
    ///
    /// Offers with negative price or commission are excluded. Equal scores
    /// are ordered by offer id so the output is deterministic.
    pub fn rank(offers: &[Offer]) -> Vec<RankedOffer> {
        let mut ranked: Vec<RankedOffer> = offers
            .iter()
            .filter(|offer| match offer.validate() {
                Ok(()) => true,
                Err(e) => {
                    debug!(offer_id = %offer.id, error = %e, "Excluding invalid offer from ranking");
                    false
                }
            })
            .map(|offer| RankedOffer {
                score: Self::score(offer),
                offer: offer.clone(),
            })
            .collect();

        ranked.sort_by(|a, b| {
            Reverse(OrderedFloat(a.score))
                .cmp(&Reverse(OrderedFloat(b.score)))
                .then_with(|| a.offer.id.cmp(&b.offer.id))
        });
        ranked
    }

    /// Rank and return only the offers
    pub fn rank_offers(offers: &[Offer]) -> Vec<Offer> {
        Self::rank(offers).into_iter().map(|r| r.offer).collect()
    }
}
