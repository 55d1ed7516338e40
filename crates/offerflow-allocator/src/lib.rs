//! # Offerflow Allocator
//!
//! Thompson-sampled offer allocation for content items.
//!
//! ## Selection
//!
//! ```text
//! value = p × rpc × boost
//! ```
//!
//! Where:
//! - p: draw from Beta(α+1, β+1)
//! - rpc: the arm's revenue per conversion once it has `min_observations`
//!   conversions, otherwise the offer's eRPC
//! - boost: strongest event-window multiplier applying to the offer
//!
//! The highest value wins; equal values go to the lowest arm id.
//!
//! ## Cold start
//!
//! A content item with no enabled arms is seeded from the top `cold_start_top_n`
//! offers by eRPC. With no arms at all and no keyword, the top offer is only
//! suggested and no arms are created.

pub mod bandit;
pub mod calendar;
pub mod catalog;
pub mod erpc;
pub mod sampler;
pub mod store;

pub use bandit::{ArmSelection, BanditAllocator, Selection, Suggestion};
pub use calendar::{ActiveBoost, EventCalendar};
pub use catalog::{CatalogSnapshot, OfferCatalog, RefreshReport};
pub use erpc::{ErpcRanker, RankedOffer};
pub use sampler::{PosteriorMean, PosteriorSampler, RngSampler};
pub use store::{ArmCandidate, ArmStore, InMemoryArmStore};

use offerflow_common::{DEFAULT_COLD_START_TOP_N, DEFAULT_MIN_OBSERVATIONS};
use serde::Deserialize;

/// Allocator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Arms materialized from the eRPC ranking on cold start
    pub cold_start_top_n: usize,
    /// Conversions before an arm's own revenue replaces eRPC
    pub min_observations: u64,
    /// Fixed seed for reproducible selection; `None` draws from entropy
    pub sampler_seed: Option<u64>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            cold_start_top_n: DEFAULT_COLD_START_TOP_N,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            sampler_seed: None,
        }
    }
}
