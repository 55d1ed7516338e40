//! eRPC module
//!
//! Effective revenue per click, used as the cold-start prior before an arm
//! has enough conversions of its own.

pub mod ranker;

pub use ranker::{ErpcRanker, RankedOffer};
