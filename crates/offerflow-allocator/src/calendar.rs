//! Event calendar
//!
//! Promotional windows pushed in by the calendar-population job. Reads load
//! an immutable snapshot and never block; a refresh swaps the whole set.
//!
//! ## Combination rule
//!
//! When several windows are active for the same offer, the one with the
//! largest multiplier wins. Equal multipliers resolve to the window with the
//! earliest `start_ts`, then to calendar order. Multipliers are never stacked.

use std::sync::Arc;

use arc_swap::ArcSwap;
use offerflow_common::{EventWindow, Result};
use serde::Serialize;
use tracing::info;

/// Boost in effect for one offer at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveBoost {
    pub multiplier: f64,
    /// Window that supplied the multiplier
    pub window: Option<EventWindow>,
}

impl ActiveBoost {
    /// No active window
    pub fn none() -> Self {
        Self {
            multiplier: 1.0,
            window: None,
        }
    }
}

impl Default for ActiveBoost {
    fn default() -> Self {
        Self::none()
    }
}

/// Lock-free event calendar
pub struct EventCalendar {
    windows: ArcSwap<Vec<EventWindow>>,
}

impl EventCalendar {
    /// Create an empty calendar
    pub fn new() -> Self {
        Self {
            windows: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replace every window.
    ///
    /// The whole batch is rejected if any window is malformed; the previous
    /// snapshot stays in effect.
    pub fn replace(&self, windows: Vec<EventWindow>) -> Result<usize> {
        for window in &windows {
            window.validate()?;
        }
        let count = windows.len();
        self.windows.store(Arc::new(windows));
        info!(count, "Event calendar refreshed");
        Ok(count)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Vec<EventWindow>> {
        self.windows.load_full()
    }

    /// Windows active at `now`
    pub fn active_at(&self, now: i64) -> Vec<EventWindow> {
        self.windows
            .load()
            .iter()
            .filter(|w| w.is_active(now))
            .cloned()
            .collect()
    }

    /// Combined boost over every window active at `now`, regardless of scope
    pub fn boost_at(&self, now: i64) -> ActiveBoost {
        combine(self.windows.load().iter().filter(|w| w.is_active(now)))
    }

    /// Combined boost for an offer from `network` at `now`
    pub fn boost_for(&self, now: i64, network: Option<&str>) -> ActiveBoost {
        boost_in(&self.windows.load(), now, network)
    }

    /// Windows starting within `(now, now + horizon_ms]`, earliest first
    pub fn upcoming(&self, now: i64, horizon_ms: i64) -> Vec<EventWindow> {
        let mut upcoming: Vec<EventWindow> = self
            .windows
            .load()
            .iter()
            .filter(|w| w.start_ts > now && w.start_ts <= now.saturating_add(horizon_ms))
            .cloned()
            .collect();
        upcoming.sort_by_key(|w| w.start_ts);
        upcoming
    }
}

impl Default for EventCalendar {
    fn default() -> Self {
        Self::new()
    }
}

/// Combined boost for `network` over an already-loaded window set
pub fn boost_in(windows: &[EventWindow], now: i64, network: Option<&str>) -> ActiveBoost {
    combine(
        windows
            .iter()
            .filter(|w| w.is_active(now) && w.applies_to(network)),
    )
}

/// Max multiplier, ties to the earliest start
fn combine<'a>(active: impl Iterator<Item = &'a EventWindow>) -> ActiveBoost {
    let mut best: Option<&EventWindow> = None;
    for window in active {
        best = match best {
            None => Some(window),
            Some(current) => {
                let m = window.boost.multiplier;
                let c = current.boost.multiplier;
                if m > c || (m == c && window.start_ts < current.start_ts) {
                    Some(window)
                } else {
                    Some(current)
                }
            }
        };
    }

    match best {
        Some(window) => ActiveBoost {
            multiplier: window.boost.multiplier,
            window: Some(window.clone()),
        },
        None => ActiveBoost::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerflow_common::{EventCode, UrgencyLevel};

    #[test]
    fn test_no_windows_means_unit_boost() {
        let calendar = EventCalendar::new();
        let boost = calendar.boost_at(1_000);
        assert_eq!(boost.multiplier, 1.0);
        assert!(boost.window.is_none());
    }

    #[test]
    fn test_overlapping_windows_take_max() {
        let calendar = EventCalendar::new();
        calendar
            .replace(vec![
                EventWindow::new(EventCode::MonthlySaleDay, 0, 1_000, 1.5),
                EventWindow::new(EventCode::BlackFriday, 500, 2_000, 2.0),
            ])
            .unwrap();

        assert_eq!(calendar.boost_at(600).multiplier, 2.0);
        assert_eq!(calendar.boost_at(100).multiplier, 1.5);
        assert_eq!(calendar.boost_at(1_500).multiplier, 2.0);
        assert_eq!(calendar.boost_at(2_000).multiplier, 1.0);
    }

    #[test]
    fn test_tie_resolves_to_earliest_start() {
        let calendar = EventCalendar::new();
        calendar
            .replace(vec![
                EventWindow::new(EventCode::CyberMonday, 200, 1_000, 2.0)
                    .with_badge("later", UrgencyLevel::Low),
                EventWindow::new(EventCode::BlackFriday, 100, 1_000, 2.0)
                    .with_badge("earlier", UrgencyLevel::High),
            ])
            .unwrap();

        let boost = calendar.boost_at(500);
        assert_eq!(boost.window.unwrap().boost.badge_text, "earlier");
    }

    #[test]
    fn test_scoped_boost() {
        let calendar = EventCalendar::new();
        calendar
            .replace(vec![
                EventWindow::new(EventCode::YearEnd, 0, 1_000, 1.2),
                EventWindow::new(EventCode::PrimeDay, 0, 1_000, 3.0).with_scope("amazon"),
            ])
            .unwrap();

        assert_eq!(calendar.boost_for(10, Some("amazon")).multiplier, 3.0);
        assert_eq!(calendar.boost_for(10, Some("rakuten")).multiplier, 1.2);
        assert_eq!(calendar.boost_for(10, None).multiplier, 1.2);
        assert_eq!(calendar.boost_at(10).multiplier, 3.0);
    }

    #[test]
    fn test_malformed_batch_keeps_previous_snapshot() {
        let calendar = EventCalendar::new();
        calendar
            .replace(vec![EventWindow::new(EventCode::SuperSale, 0, 100, 1.5)])
            .unwrap();

        let result = calendar.replace(vec![
            EventWindow::new(EventCode::SuperSale, 0, 100, 2.0),
            EventWindow::new(EventCode::Other, 100, 50, 2.0),
        ]);
        assert!(result.is_err());
        assert_eq!(calendar.boost_at(10).multiplier, 1.5);
    }

    #[test]
    fn test_upcoming() {
        let calendar = EventCalendar::new();
        calendar
            .replace(vec![
                EventWindow::new(EventCode::YearEnd, 5_000, 6_000, 1.1),
                EventWindow::new(EventCode::SuperSale, 2_000, 3_000, 1.3),
                EventWindow::new(EventCode::Other, 0, 1_500, 1.3),
            ])
            .unwrap();

        let upcoming = calendar.upcoming(1_000, 4_500);
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].code, EventCode::SuperSale);
        assert_eq!(calendar.active_at(1_000).len(), 1);
    }
}
