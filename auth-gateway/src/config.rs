use chrono::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Consecutive failed attempts before a (non-exempt) account locks.
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    /// TOTP time-step tolerance in steps either side of now.
    pub totp_drift_steps: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
            totp_drift_steps: 1,
        }
    }
}
