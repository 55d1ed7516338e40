//! Offer - normalized monetizable offer from an external network
//!
//! Offers are immutable snapshots pushed in by network adapters. The core
//! never mutates them; a refresh replaces the whole catalog.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Offer identifier as assigned by the upstream network
pub type OfferId = String;

/// Basis-point denominator (10000 bps = 100%)
pub const BPS_DENOMINATOR: f64 = 10_000.0;

/// Normalized offer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Network-assigned offer ID
    pub id: OfferId,

    /// Source network identifier (e.g., "amazon", "rakuten")
    pub network: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Category used for keyword filtering
    #[serde(default)]
    pub category: String,

    /// Additional keywords used for filtering
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Affiliate link for rendering
    #[serde(default)]
    pub link_url: String,

    /// Price in minor currency units
    pub price: i64,

    /// Commission rate in basis points
    pub commission_bps: i64,

    /// Conversion-rate proxy (network-reported or historical estimate)
    pub conversion_rate: f64,

    /// Last refresh timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Offer {
    /// Create a new offer
    pub fn new(
        id: impl Into<OfferId>,
        network: impl Into<String>,
        price: i64,
        commission_bps: i64,
        conversion_rate: f64,
    ) -> Self {
        Self {
            id: id.into(),
            network: network.into(),
            title: String::new(),
            category: String::new(),
            keywords: Vec::new(),
            link_url: String::new(),
            price,
            commission_bps,
            conversion_rate,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Add a keyword
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    /// Set affiliate link
    pub fn with_link(mut self, link_url: impl Into<String>) -> Self {
        self.link_url = link_url.into();
        self
    }

    /// Reject negative price or commission
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.price < 0 {
            return Err(ValidationError::NegativePrice {
                offer_id: self.id.clone(),
                price: self.price,
            });
        }
        if self.commission_bps < 0 {
            return Err(ValidationError::NegativeCommission {
                offer_id: self.id.clone(),
                bps: self.commission_bps,
            });
        }
        Ok(())
    }

    /// Commission earned per conversion, in minor units
    pub fn commission_per_conversion(&self) -> f64 {
        self.price as f64 * (self.commission_bps as f64 / BPS_DENOMINATOR)
    }

    /// Case-insensitive keyword match over title, category and keywords
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self.category.to_lowercase().contains(&needle)
            || self
                .keywords
                .iter()
                .any(|k| k.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_negative_values() {
        let offer = Offer::new("a", "net", -1, 500, 0.05);
        assert!(matches!(
            offer.validate(),
            Err(ValidationError::NegativePrice { price: -1, .. })
        ));

        let offer = Offer::new("b", "net", 100, -5, 0.05);
        assert!(matches!(
            offer.validate(),
            Err(ValidationError::NegativeCommission { bps: -5, .. })
        ));

        assert!(Offer::new("c", "net", 0, 0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_keyword_match() {
        let offer = Offer::new("a", "net", 100, 500, 0.05)
            .with_title("Wireless Earbuds")
            .with_category("Audio")
            .with_keyword("bluetooth");

        assert!(offer.matches_keyword("earbuds"));
        assert!(offer.matches_keyword("AUDIO"));
        assert!(offer.matches_keyword("Blue"));
        assert!(offer.matches_keyword("  "));
        assert!(!offer.matches_keyword("camera"));
    }

    #[test]
    fn test_commission_per_conversion() {
        let offer = Offer::new("a", "net", 10_000, 500, 0.05);
        assert!((offer.commission_per_conversion() - 500.0).abs() < f64::EPSILON);
    }
}
