use std::time::Duration;

/// Device id the lock controller firmware reports in `source`.
pub const DEFAULT_DEVICE_ID: &str = "stm32";

/// Default control-client port.
pub const DEFAULT_PORT: u16 = 8080;

/// Runtime settings for the relay loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the control-client listener binds to (`host:port`).
    pub listen_addr: String,
    /// Only device events with this `source` are accepted.
    pub device_id: String,
    /// Upper bound on one loop iteration.
    pub poll_timeout: Duration,
    /// Delay between device reopen attempts.
    pub reconnect_interval: Duration,
    /// Consecutive reopen failures before the relay gives up.
    pub max_reconnect_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            poll_timeout: Duration::from_millis(100),
            reconnect_interval: Duration::from_secs(2),
            max_reconnect_attempts: 5,
        }
    }
}
