//! Administrative audit log
//!
//! Records operations that change allocation state outside the normal event
//! flow:
//! - Arm counter resets (the only path allowed to lower α/β/revenue)
//! - Arm enable/disable
//! - Catalog and calendar refreshes

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    /// Counter reset on an arm
    CounterReset,
    /// Arm enabled or disabled
    ArmState,
    /// Offer catalog replaced
    CatalogRefresh,
    /// Event calendar replaced
    CalendarRefresh,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditCategory::CounterReset => write!(f, "RESET"),
            AuditCategory::ArmState => write!(f, "ARM"),
            AuditCategory::CatalogRefresh => write!(f, "CATALOG"),
            AuditCategory::CalendarRefresh => write!(f, "CALENDAR"),
        }
    }
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub event_id: String,

    /// Timestamp (Unix millis)
    pub timestamp: i64,

    pub category: AuditCategory,

    /// Who requested the operation
    pub actor: String,

    /// Target resource (e.g., "arm-12")
    pub resource: Option<String>,

    /// Free-form reason supplied by the actor
    pub reason: Option<String>,

    /// Additional details (sorted for stable output)
    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(category: AuditCategory, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            category,
            actor: actor.to_string(),
            resource: None,
            reason: None,
            details: BTreeMap::new(),
        }
    }

    /// Set resource
    pub fn with_resource(mut self, resource: impl ToString) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    /// Set reason
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Add detail
    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Audit log sink
pub trait AuditSink: Send + Sync {
    /// Write an audit event
    fn write(&self, event: &AuditEvent);
}

/// Emits audit events through `tracing`
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, event: &AuditEvent) {
        let line = format!(
            "[{}] {} actor={} resource={} reason={}",
            event.category,
            event.event_id,
            event.actor,
            event.resource.as_deref().unwrap_or("-"),
            event.reason.as_deref().unwrap_or("-"),
        );
        match event.category {
            AuditCategory::CounterReset => warn!(details = ?event.details, "{}", line),
            _ => info!(details = ?event.details, "{}", line),
        }
    }
}

/// Retains events in memory for later inspection
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all retained events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, event: &AuditEvent) {
        self.events.write().push(event.clone());
    }
}

/// Audit log fan-out
pub struct AuditLog {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditLog {
    /// Create an audit log writing to `tracing`
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(TracingAuditSink)],
        }
    }

    /// Add a sink
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Log an audit event
    pub fn log(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.write(&event);
        }
    }

    /// Log an arm counter reset with the counters it discarded
    pub fn log_counter_reset(
        &self,
        actor: &str,
        arm: &crate::types::arm::Arm,
        reason: &str,
    ) {
        let event = AuditEvent::new(AuditCategory::CounterReset, actor)
            .with_resource(arm.id)
            .with_reason(reason)
            .with_detail("successes", arm.successes)
            .with_detail("failures", arm.failures)
            .with_detail("clicks", arm.clicks)
            .with_detail("revenue", arm.revenue);
        self.log(event);
    }

    /// Log an arm enable/disable
    pub fn log_arm_state(&self, actor: &str, arm_id: crate::types::arm::ArmId, enabled: bool) {
        let event = AuditEvent::new(AuditCategory::ArmState, actor)
            .with_resource(arm_id)
            .with_detail("enabled", enabled);
        self.log(event);
    }

    /// Log a snapshot refresh
    pub fn log_refresh(&self, category: AuditCategory, actor: &str, accepted: usize, rejected: usize) {
        let event = AuditEvent::new(category, actor)
            .with_detail("accepted", accepted)
            .with_detail("rejected", rejected);
        self.log(event);
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::arm::{Arm, ArmId};
    use rust_decimal_macros::dec;

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(AuditCategory::CounterReset, "ops@example.com")
            .with_resource(ArmId(3))
            .with_reason("tracking bug")
            .with_detail("clicks", 10);

        assert_eq!(event.category, AuditCategory::CounterReset);
        assert_eq!(event.resource.as_deref(), Some("arm-3"));
        assert_eq!(event.details.get("clicks"), Some(&"10".to_string()));
    }

    #[test]
    fn test_counter_reset_captures_previous_counters() {
        let sink = Arc::new(MemoryAuditSink::new());
        let log = AuditLog::new().with_sink(sink.clone());

        let mut arm = Arm::new(ArmId(5), "post-1", "offer-a", "");
        arm.apply_click();
        arm.apply_conversion(dec!(120)).unwrap();
        log.log_counter_reset("ops", &arm, "double-fired pixel");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details.get("revenue"), Some(&"120".to_string()));
        assert_eq!(events[0].reason.as_deref(), Some("double-fired pixel"));
    }
}
