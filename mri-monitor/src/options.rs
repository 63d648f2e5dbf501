use std::{path::PathBuf, time::Duration};

use crate::ewma::DEFAULT_ALPHA;

/// Interface the monitor captures on by default.
pub const DEFAULT_INTERFACE: &str = "h99-eth0";

/// Shortest accepted verify interval.
pub const MIN_VERIFY_INTERVAL: Duration = Duration::from_millis(1);

/// Options for the [`CongestionMonitor`](crate::CongestionMonitor).
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// A flow without packets for longer than this is inactive.
    pub(crate) activity_timeout: Duration,
    /// How often flows are checked for inactivity.
    pub(crate) verify_interval: Duration,
    /// Minimum time between two reports for the same switch.
    pub(crate) cooldown: Duration,
    /// A sample whose time delta exceeds this (in microseconds) is congested.
    pub(crate) delay_threshold_us: u32,
    /// A sample whose queue depth exceeds this (in packets) is congested.
    pub(crate) queue_threshold: u32,
    /// Smoothing factor of the delay and queue estimates.
    pub(crate) alpha: f64,
    /// Directory holding the per-switch rule logs.
    pub(crate) rules_dir: PathBuf,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            activity_timeout: Duration::from_secs(2),
            verify_interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(1),
            delay_threshold_us: 0,
            queue_threshold: 30,
            alpha: DEFAULT_ALPHA,
            rules_dir: PathBuf::from("rules"),
        }
    }
}

impl MonitorOptions {
    /// Sets the time without packets after which a flow is considered inactive.
    pub fn activity_timeout(mut self, activity_timeout: Duration) -> Self {
        self.activity_timeout = activity_timeout;
        self
    }

    /// Sets how often flows are checked for inactivity. Raised to [`MIN_VERIFY_INTERVAL`] if
    /// shorter.
    pub fn verify_interval(mut self, verify_interval: Duration) -> Self {
        self.verify_interval = verify_interval.max(MIN_VERIFY_INTERVAL);
        self
    }

    /// Sets the minimum time between two congestion reports for the same switch.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the per-hop delay, in microseconds, above which a switch is congested.
    pub fn delay_threshold_us(mut self, delay_threshold_us: u32) -> Self {
        self.delay_threshold_us = delay_threshold_us;
        self
    }

    /// Sets the queue depth, in packets, above which a switch is congested.
    pub fn queue_threshold(mut self, queue_threshold: u32) -> Self {
        self.queue_threshold = queue_threshold;
        self
    }

    /// Sets the smoothing factor of the delay and queue estimates.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the directory the rule logs are read from.
    pub fn rules_dir(mut self, rules_dir: impl Into<PathBuf>) -> Self {
        self.rules_dir = rules_dir.into();
        self
    }
}
