use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Polling knobs. The poller itself never gives up; `timeout` bounds the caller's wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS), timeout: None }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// `STRATUS_POLL_INTERVAL_SECS` (default 10, min 1) and `STRATUS_WAIT_TIMEOUT_SECS` (unset or 0 = no bound).
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let interval_secs = get("STRATUS_POLL_INTERVAL_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(1);
        let timeout = get("STRATUS_WAIT_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        Self { interval: Duration::from_secs(interval_secs), timeout }
    }

    /// Apply command-line overrides on top of env/defaults.
    pub fn with_overrides(mut self, interval_secs: Option<u64>, timeout_secs: Option<u64>) -> Self {
        if let Some(s) = interval_secs {
            self.interval = Duration::from_secs(s.max(1));
        }
        if let Some(s) = timeout_secs {
            self.timeout = if s == 0 { None } else { Some(Duration::from_secs(s)) };
        }
        self
    }
}
