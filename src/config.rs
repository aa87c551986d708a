//! Runtime configuration, loaded from the environment variables enumerated
//! by the wire protocol's configuration surface.
//!
//! Mirrors the teacher's `Config::load`/`apply_env_overrides` split: start
//! from documented defaults, then let each env var override its field if
//! present and parseable.

/// Tunable knobs governing claim leases, queue capacities, timeouts, and
/// presence windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Hard claim lease duration, in seconds. Default 120.
    pub claim_lease_max_secs: u64,
    /// Idle-without-input demotion window, in seconds. Default 60.
    pub claim_idle_max_secs: u64,
    /// Output-lane queue capacity per subscriber. Default 256.
    pub subscriber_queue_output: usize,
    /// Priority-lane queue capacity per subscriber. Default 64.
    pub subscriber_queue_priority: usize,
    /// Writer-task deadline, in milliseconds. Default 10000.
    pub write_deadline_ms: u64,
    /// Application-level ping interval, in milliseconds. Default 20000.
    pub ping_interval_ms: u64,
    /// Empty-session reap grace period, in milliseconds. Default 30000.
    pub hub_reap_grace_ms: u64,
    /// Seconds of inactivity before a subscriber flips to idle. Default 600.
    pub presence_idle_secs: u64,
    /// Seconds of inactivity before a subscriber is evicted. Default 1800.
    pub presence_evict_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            claim_lease_max_secs: 120,
            claim_idle_max_secs: 60,
            subscriber_queue_output: 256,
            subscriber_queue_priority: 64,
            write_deadline_ms: 10_000,
            ping_interval_ms: 20_000,
            hub_reap_grace_ms: 30_000,
            presence_idle_secs: 600,
            presence_evict_secs: 1800,
        }
    }
}

impl Config {
    /// Load defaults, then apply any of the documented env var overrides.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        apply_u64_env("CLAIM_LEASE_MAX", &mut self.claim_lease_max_secs);
        apply_u64_env("CLAIM_IDLE_MAX", &mut self.claim_idle_max_secs);
        apply_usize_env("SUBSCRIBER_QUEUE_OUTPUT", &mut self.subscriber_queue_output);
        apply_usize_env("SUBSCRIBER_QUEUE_PRIORITY", &mut self.subscriber_queue_priority);
        apply_u64_env("WRITE_DEADLINE_MS", &mut self.write_deadline_ms);
        apply_u64_env("PING_INTERVAL_MS", &mut self.ping_interval_ms);
        apply_u64_env("HUB_REAP_GRACE_MS", &mut self.hub_reap_grace_ms);
        apply_u64_env("PRESENCE_IDLE_SEC", &mut self.presence_idle_secs);
        apply_u64_env("PRESENCE_EVICT_SEC", &mut self.presence_evict_secs);
    }

    /// Hard claim lease as a [`std::time::Duration`].
    #[must_use]
    pub fn claim_lease_max(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.claim_lease_max_secs)
    }

    /// Idle-demotion window as a [`std::time::Duration`].
    #[must_use]
    pub fn claim_idle_max(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.claim_idle_max_secs)
    }

    /// Write deadline as a [`std::time::Duration`].
    #[must_use]
    pub fn write_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_deadline_ms)
    }

    /// Ping interval as a [`std::time::Duration`].
    #[must_use]
    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval_ms)
    }

    /// Hub reap grace period as a [`std::time::Duration`].
    #[must_use]
    pub fn hub_reap_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hub_reap_grace_ms)
    }

    /// Presence idle-flip window as a [`std::time::Duration`].
    #[must_use]
    pub fn presence_idle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.presence_idle_secs)
    }

    /// Presence eviction window as a [`std::time::Duration`].
    #[must_use]
    pub fn presence_evict(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.presence_evict_secs)
    }
}

fn apply_u64_env(name: &str, field: &mut u64) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(value) = raw.parse::<u64>() {
            *field = value;
        }
    }
}

fn apply_usize_env(name: &str, field: &mut usize) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(value) = raw.parse::<usize>() {
            *field = value;
        }
    }
}
