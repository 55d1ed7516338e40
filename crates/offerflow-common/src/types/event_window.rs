//! EventWindow - time-bounded promotional period with boost metadata

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Promotional event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCode {
    /// Recurring monthly discount day (e.g., days ending in 5 or 0)
    MonthlySaleDay,
    /// Multi-day shopping marathon
    ShoppingMarathon,
    PrimeDay,
    BlackFriday,
    CyberMonday,
    /// Quarterly super sale
    SuperSale,
    YearEnd,
    /// Anything the calendar job cannot classify
    Other,
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventCode::MonthlySaleDay => "monthly_sale_day",
            EventCode::ShoppingMarathon => "shopping_marathon",
            EventCode::PrimeDay => "prime_day",
            EventCode::BlackFriday => "black_friday",
            EventCode::CyberMonday => "cyber_monday",
            EventCode::SuperSale => "super_sale",
            EventCode::YearEnd => "year_end",
            EventCode::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Urgency shown alongside the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for UrgencyLevel {
    fn default() -> Self {
        UrgencyLevel::Medium
    }
}

/// Boost applied while a window is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostMetadata {
    /// Multiplier applied to boosted expected value
    pub multiplier: f64,
    #[serde(default)]
    pub urgency: UrgencyLevel,
    #[serde(default)]
    pub badge_text: String,
}

/// Promotional calendar window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWindow {
    pub code: EventCode,
    /// Inclusive start (Unix milliseconds)
    pub start_ts: i64,
    /// Exclusive end (Unix milliseconds)
    pub end_ts: i64,
    pub boost: BoostMetadata,
    /// Network the window applies to; `None` applies to every offer
    #[serde(default)]
    pub scope: Option<String>,
}

impl EventWindow {
    /// Create a window with default urgency and no badge
    pub fn new(code: EventCode, start_ts: i64, end_ts: i64, multiplier: f64) -> Self {
        Self {
            code,
            start_ts,
            end_ts,
            boost: BoostMetadata {
                multiplier,
                urgency: UrgencyLevel::default(),
                badge_text: String::new(),
            },
            scope: None,
        }
    }

    /// Restrict the window to offers from one network
    pub fn with_scope(mut self, network: impl Into<String>) -> Self {
        self.scope = Some(network.into());
        self
    }

    /// Set badge text and urgency
    pub fn with_badge(mut self, badge_text: impl Into<String>, urgency: UrgencyLevel) -> Self {
        self.boost.badge_text = badge_text.into();
        self.boost.urgency = urgency;
        self
    }

    /// Active on `[start_ts, end_ts)`
    #[inline]
    pub fn is_active(&self, now: i64) -> bool {
        self.start_ts <= now && now < self.end_ts
    }

    /// Whether the window boosts offers from `network`.
    ///
    /// Unscoped windows apply everywhere; scoped windows never apply to an
    /// offer whose network is unknown.
    pub fn applies_to(&self, network: Option<&str>) -> bool {
        match (&self.scope, network) {
            (None, _) => true,
            (Some(scope), Some(network)) => scope.eq_ignore_ascii_case(network),
            (Some(_), None) => false,
        }
    }

    /// Reject inverted ranges and non-positive multipliers
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_ts <= self.start_ts {
            return Err(ValidationError::MalformedWindow {
                code: self.code.to_string(),
                start_ts: self.start_ts,
                end_ts: self.end_ts,
            });
        }
        let m = self.boost.multiplier;
        if !m.is_finite() || m <= 0.0 {
            return Err(ValidationError::InvalidMultiplier(m));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_is_half_open() {
        let w = EventWindow::new(EventCode::PrimeDay, 100, 200, 1.5);
        assert!(!w.is_active(99));
        assert!(w.is_active(100));
        assert!(w.is_active(199));
        assert!(!w.is_active(200));
    }

    #[test]
    fn test_scope() {
        let global = EventWindow::new(EventCode::YearEnd, 0, 1, 1.1);
        let scoped = EventWindow::new(EventCode::PrimeDay, 0, 1, 2.0).with_scope("amazon");

        assert!(global.applies_to(None));
        assert!(global.applies_to(Some("rakuten")));
        assert!(scoped.applies_to(Some("Amazon")));
        assert!(!scoped.applies_to(Some("rakuten")));
        assert!(!scoped.applies_to(None));
    }

    #[test]
    fn test_validate() {
        assert!(EventWindow::new(EventCode::BlackFriday, 100, 200, 2.0).validate().is_ok());
        assert!(EventWindow::new(EventCode::BlackFriday, 200, 200, 2.0).validate().is_err());
        assert!(EventWindow::new(EventCode::BlackFriday, 100, 200, 0.0).validate().is_err());
        assert!(EventWindow::new(EventCode::BlackFriday, 100, 200, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_serde_codes() {
        let w = EventWindow::new(EventCode::MonthlySaleDay, 0, 1, 1.2)
            .with_badge("5と0のつく日", UrgencyLevel::High);
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"monthly_sale_day\""));
        assert!(json.contains("\"high\""));
        let back: EventWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
