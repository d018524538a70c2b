use async_trait::async_trait;
use parking_lot::Mutex;

use crate::event::{SecurityEvent, Severity};

/// Where security events land. Implementations must be infallible from the
/// caller's point of view: auditing never blocks or fails an auth decision.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: SecurityEvent);
}

/// Default sink: structured `tracing` events at a level matching severity.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: SecurityEvent) {
        let user = event
            .user_id
            .map(|u| u.to_string())
            .unwrap_or_else(|| "-".into());
        match event.severity {
            Severity::Info | Severity::Low => tracing::info!(
                event_type = %event.event_type,
                user_id = %user,
                ip = event.ip_address.as_deref().unwrap_or("-"),
                metadata = %event.metadata,
                "security event"
            ),
            Severity::Medium => tracing::warn!(
                event_type = %event.event_type,
                user_id = %user,
                ip = event.ip_address.as_deref().unwrap_or("-"),
                metadata = %event.metadata,
                "security event"
            ),
            Severity::High | Severity::Critical => tracing::error!(
                event_type = %event.event_type,
                user_id = %user,
                ip = event.ip_address.as_deref().unwrap_or("-"),
                metadata = %event.metadata,
                "security event"
            ),
        }
    }
}

/// Test sink capturing every event for assertions.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.event_type == event_type)
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: SecurityEvent) {
        self.events.lock().push(event);
    }
}
