//! Prometheus instrumentation for the engine facade

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

/// Engine counters
#[derive(Clone)]
pub struct EngineMetrics {
    pub selections_learned: IntCounter,
    pub selections_suggested: IntCounter,
    pub selections_not_found: IntCounter,
    pub selection_duration_seconds: Histogram,
    pub clicks_total: IntCounter,
    pub impressions_total: IntCounter,
    pub sales_created: IntCounter,
    pub sales_duplicate: IntCounter,
    pub terminal_transitions_ignored: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            selections_learned: IntCounter::new(
                "offerflow_selections_learned_total",
                "Selections backed by a learning arm",
            )?,
            selections_suggested: IntCounter::new(
                "offerflow_selections_suggested_total",
                "Suggestion-only selections without arms",
            )?,
            selections_not_found: IntCounter::new(
                "offerflow_selections_not_found_total",
                "Selections that found no offer",
            )?,
            selection_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "offerflow_selection_duration_seconds",
                    "Offer selection latency",
                )
                .buckets(vec![0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05]),
            )?,
            clicks_total: IntCounter::new("offerflow_clicks_total", "Clicks recorded")?,
            impressions_total: IntCounter::new(
                "offerflow_impressions_total",
                "Impressions recorded",
            )?,
            sales_created: IntCounter::new("offerflow_sales_created_total", "Sales written to the ledger")?,
            sales_duplicate: IntCounter::new(
                "offerflow_sales_duplicate_total",
                "Replayed sales ignored by order id",
            )?,
            terminal_transitions_ignored: IntCounter::new(
                "offerflow_terminal_transitions_ignored_total",
                "Status updates ignored on terminal sales",
            )?,
        })
    }

    /// Register every metric with `registry`
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.selections_learned.clone()))?;
        registry.register(Box::new(self.selections_suggested.clone()))?;
        registry.register(Box::new(self.selections_not_found.clone()))?;
        registry.register(Box::new(self.selection_duration_seconds.clone()))?;
        registry.register(Box::new(self.clicks_total.clone()))?;
        registry.register(Box::new(self.impressions_total.clone()))?;
        registry.register(Box::new(self.sales_created.clone()))?;
        registry.register(Box::new(self.sales_duplicate.clone()))?;
        registry.register(Box::new(self.terminal_transitions_ignored.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_fails() {
        let metrics = EngineMetrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());

        metrics.clicks_total.inc();
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "offerflow_clicks_total"));
    }
}
