//! KPI module
//!
//! Read-side rollups for dashboards: conversion rate, EPC, ROI, top
//! performers and the daily series.

pub mod aggregator;
pub mod spend;

pub use aggregator::KpiAggregator;
pub use spend::SpendModel;
