//! Engine configuration
//!
//! Sources, later ones overriding earlier:
//! 1. built-in defaults
//! 2. `config/offerflow.{toml,yaml,json}` (optional)
//! 3. `OFFERFLOW__SECTION__KEY` environment variables, `.env` included

use offerflow_allocator::AllocatorConfig;
use offerflow_common::{OfferflowError, Result};
use offerflow_ledger::{LedgerConfig, SpendModel};
use serde::Deserialize;

/// Engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub allocator: AllocatorConfig,
    pub ledger: LedgerConfig,
    pub spend: SpendModel,
    pub metrics: MetricsSettings,
}

/// Metrics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Register engine metrics with the default Prometheus registry
    pub register_default: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            register_default: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/offerflow").required(false))
            .add_source(
                config::Environment::with_prefix("OFFERFLOW")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    /// Load from a TOML document, over the defaults
    pub fn from_toml(toml: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| OfferflowError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.allocator.cold_start_top_n, 3);
        assert_eq!(config.allocator.min_observations, 3);
        assert!(config.allocator.sampler_seed.is_none());
        assert_eq!(config.ledger.default_currency, "JPY");
        assert!(config.metrics.register_default);
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let config = EngineConfig::from_toml(
            r#"
            [allocator]
            cold_start_top_n = 5
            sampler_seed = 7

            [spend]
            cost_per_click = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.allocator.cold_start_top_n, 5);
        assert_eq!(config.allocator.min_observations, 3);
        assert_eq!(config.allocator.sampler_seed, Some(7));
        assert_eq!(config.spend.cost_per_click, dec!(12));
        assert_eq!(config.ledger.top_k, 10);
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let err = EngineConfig::from_toml("[allocator]\ncold_start_top_n = \"many\"").unwrap_err();
        assert!(matches!(err, OfferflowError::Config(_)));
    }
}
