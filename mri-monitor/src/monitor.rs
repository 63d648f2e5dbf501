use std::{net::Ipv4Addr, sync::Arc, time::Instant};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use mri_common::switch_name;
use mri_wire::{SwitchTrace, TelemetryFrame};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::{
    CongestionReport, MonitorError, MonitorOptions, MonitorStats, RuleBook, SwitchState,
};

/// Per-switch telemetry state and congestion detection.
///
/// Each switch's state sits behind its own lock, so a sweep never interleaves with a sample
/// update of the same switch while different switches can be updated in parallel.
#[derive(Debug)]
pub struct CongestionMonitor {
    options: MonitorOptions,
    rules: RuleBook,
    switches: RwLock<FxHashMap<u16, Arc<Mutex<SwitchState>>>>,
    stats: MonitorStats,
}

impl CongestionMonitor {
    /// Creates a monitor resolving rule ids against `rules`.
    pub fn new(rules: RuleBook, options: MonitorOptions) -> Self {
        Self { options, rules, switches: RwLock::default(), stats: MonitorStats::default() }
    }

    /// Creates a monitor with the rule logs found in the configured rules directory.
    pub fn load(options: MonitorOptions) -> Result<Self, MonitorError> {
        let rules = RuleBook::load(&options.rules_dir)?;
        Ok(Self::new(rules, options))
    }

    /// The options the monitor was created with.
    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Counters of the telemetry path.
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// The state of switch `switch_id`, if it sent any trace yet.
    pub fn switch(&self, switch_id: u16) -> Option<Arc<Mutex<SwitchState>>> {
        self.switches.read().get(&switch_id).cloned()
    }

    /// Ids of every switch seen so far, sorted.
    pub fn switch_ids(&self) -> Vec<u16> {
        let mut ids: Vec<_> = self.switches.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the state of `switch_id`, creating it on first use.
    fn state(&self, switch_id: u16) -> Arc<Mutex<SwitchState>> {
        if let Some(state) = self.switches.read().get(&switch_id) {
            return Arc::clone(state);
        }

        let mut switches = self.switches.write();
        let state = switches.entry(switch_id).or_insert_with(|| {
            let name = switch_name(switch_id);
            let rules = self.rules.rules(&name);
            if rules.is_none() {
                warn!(%name, "No rule log for switch, its traces cannot be matched to rules");
            }

            debug!(%name, "Tracking new switch");
            Arc::new(Mutex::new(SwitchState::new(switch_id, rules, self.options.alpha)))
        });

        Arc::clone(state)
    }

    /// Folds one trace of a packet from `source` into the state of switch `switch_id`.
    ///
    /// The flow is updated first. A trace naming a rule the switch does not have is then
    /// reported as a [`DataIntegrityError`](crate::DataIntegrityError) and leaves the estimates
    /// untouched. Otherwise the estimates are updated, and a report is returned if the trace is
    /// above a threshold and the switch's cooldown has passed.
    pub fn on_sample(
        &self,
        switch_id: u16,
        source: Ipv4Addr,
        trace: &SwitchTrace,
        now: Instant,
    ) -> Result<Option<CongestionReport>, MonitorError> {
        let state = self.state(switch_id);
        let mut state = state.lock();
        self.stats.increment_samples();

        state.observe_flow(source, now);

        if let Err(e) = state.use_rule(trace.rule_id) {
            self.stats.increment_integrity_faults();
            return Err(e.into());
        }

        state.update_estimates(trace);

        let congested = trace.queue_depth > self.options.queue_threshold ||
            trace.time_delta > self.options.delay_threshold_us;

        if !congested || !state.try_alert(now, self.options.cooldown) {
            return Ok(None);
        }

        self.stats.increment_reports();
        warn!(
            switch = state.name(),
            queue_depth = trace.queue_depth,
            time_delta = trace.time_delta,
            "Congestion detected"
        );

        Ok(Some(state.report(*trace, now)))
    }

    /// Deactivates flows idle for longer than the activity timeout, on every switch. Returns the
    /// number of flows deactivated.
    pub fn sweep(&self, now: Instant) -> usize {
        let states: Vec<_> = self.switches.read().values().cloned().collect();

        let deactivated =
            states.iter().map(|state| state.lock().sweep(now, self.options.activity_timeout)).sum();

        if deactivated > 0 {
            debug!(deactivated, "Swept idle flows");
            self.stats.add_deactivated(deactivated);
        }

        deactivated
    }

    /// Decodes a captured frame and feeds each of its traces to [`Self::on_sample`].
    ///
    /// Frames without telemetry are skipped, and truncated frames are dropped. Integrity faults
    /// are logged and do not stop the remaining traces.
    pub fn process_frame(&self, frame: &[u8], now: Instant) -> Vec<CongestionReport> {
        self.stats.increment_frames();

        let frame = match TelemetryFrame::decode(frame) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.increment_ignored();
                trace!("Ignoring frame without telemetry");
                return Vec::new();
            }
            Err(e) => {
                self.stats.increment_truncated();
                warn!(err = %e, "Dropping frame");
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for trace in &frame.traces {
            match self.on_sample(trace.switch_id, frame.source, trace, now) {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => {
                    warn!(switch_id = trace.switch_id, source = %frame.source, err = %e, "Bad trace")
                }
            }
        }

        reports
    }

    /// Processes `frames` in arrival order and sweeps idle flows on the configured interval,
    /// sending every report to `reports`. Returns once the frames run out or the report receiver
    /// is dropped.
    pub async fn run<S>(&self, mut frames: S, reports: mpsc::Sender<CongestionReport>)
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        let mut verify = tokio::time::interval(self.options.verify_interval);
        verify.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = frames.next() => {
                    let Some(frame) = frame else {
                        debug!("Frame stream ended");
                        return;
                    };

                    let now = tokio::time::Instant::now().into_std();
                    for report in self.process_frame(&frame, now) {
                        if reports.send(report).await.is_err() {
                            debug!("Report receiver dropped");
                            return;
                        }
                    }
                }
                tick = verify.tick() => {
                    self.sweep(tick.into_std());
                }
            }
        }
    }
}
