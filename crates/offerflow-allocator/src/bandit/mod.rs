//! Bandit allocator
//!
//! Chooses one arm per content request from sampled posteriors, eRPC priors
//! and active event boosts. Selection never mutates the arm store except to
//! materialize cold-start arms.

pub mod allocator;

pub use allocator::{select_from_snapshot, ArmSelection, BanditAllocator, Selection, Suggestion};
