//! Arm storage
//!
//! Per-content-item arms and their running counters.

pub mod arm_store;

pub use arm_store::{ArmCandidate, ArmStore, InMemoryArmStore};
