use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters of the telemetry path.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Frames handed to the monitor.
    frames: AtomicUsize,
    /// Frames without the telemetry header.
    ignored: AtomicUsize,
    /// Frames dropped because they were cut short.
    truncated: AtomicUsize,
    /// Traces processed.
    samples: AtomicUsize,
    /// Traces referencing a switch or rule without a log entry.
    integrity_faults: AtomicUsize,
    /// Congestion reports emitted.
    reports: AtomicUsize,
    /// Flows deactivated by sweeps.
    deactivated: AtomicUsize,
}

impl MonitorStats {
    #[inline]
    pub(crate) fn increment_frames(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_samples(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_integrity_faults(&self) {
        self.integrity_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_reports(&self) {
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_deactivated(&self, flows: usize) {
        self.deactivated.fetch_add(flows, Ordering::Relaxed);
    }

    /// Frames handed to the monitor.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }

    /// Frames without the telemetry header.
    #[inline]
    pub fn ignored(&self) -> usize {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Frames cut short.
    #[inline]
    pub fn truncated(&self) -> usize {
        self.truncated.load(Ordering::Relaxed)
    }

    /// Traces processed.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::Relaxed)
    }

    /// Traces referencing a switch or rule without a log entry.
    #[inline]
    pub fn integrity_faults(&self) -> usize {
        self.integrity_faults.load(Ordering::Relaxed)
    }

    /// Congestion reports emitted.
    #[inline]
    pub fn reports(&self) -> usize {
        self.reports.load(Ordering::Relaxed)
    }

    /// Flows deactivated by sweeps.
    #[inline]
    pub fn deactivated(&self) -> usize {
        self.deactivated.load(Ordering::Relaxed)
    }
}
