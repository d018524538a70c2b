use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

/// Outbound seam for user-facing security alerts. Delivery mechanics
/// (SMTP, provider APIs, templating) live outside the core.
#[async_trait]
pub trait EmailAlertSink: Send + Sync {
    async fn send_security_alert(&self, user_id: Uuid, subject: &str, body: &str);
}

/// Default: log the alert instead of sending it.
pub struct TracingEmailSink;

#[async_trait]
impl EmailAlertSink for TracingEmailSink {
    async fn send_security_alert(&self, user_id: Uuid, subject: &str, _body: &str) {
        tracing::warn!(user_id = %user_id, subject, "security alert email requested");
    }
}

/// Test sink capturing alert requests.
#[derive(Default)]
pub struct RecordingEmailSink {
    sent: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingEmailSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Uuid, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailAlertSink for RecordingEmailSink {
    async fn send_security_alert(&self, user_id: Uuid, subject: &str, _body: &str) {
        self.sent.lock().push((user_id, subject.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_alerts() {
        let sink = RecordingEmailSink::new();
        let user = Uuid::new_v4();
        sink.send_security_alert(user, "Unusual sign-in", "details")
            .await;

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, user);
        assert_eq!(sent[0].1, "Unusual sign-in");
    }
}
