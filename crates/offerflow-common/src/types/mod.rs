//! Core data types for Offerflow

pub mod arm;
pub mod event_window;
pub mod kpi;
pub mod metrics;
pub mod offer;
pub mod sale;
