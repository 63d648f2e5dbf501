use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use mri_common::switch_name;
use mri_wire::{RuleId, RuleRecord, SwitchTrace};

use crate::{
    report::{CongestionReport, FlowSummary, TrackedRule},
    DataIntegrityError, Ewma, FlowTracker,
};

/// Everything the monitor knows about one switch. Created on the first trace from the switch.
#[derive(Debug)]
pub struct SwitchState {
    switch_id: u16,
    name: String,
    delay: Ewma,
    queue: Ewma,
    last_alert: Option<Instant>,
    flows: FlowTracker,
    /// `None` if no rule log exists for the switch.
    rules: Option<BTreeMap<RuleId, TrackedRule>>,
    samples: u64,
}

impl SwitchState {
    pub(crate) fn new(switch_id: u16, rules: Option<&[RuleRecord]>, alpha: f64) -> Self {
        let rules = rules.map(|rules| {
            rules
                .iter()
                .map(|rule| (rule.id, TrackedRule { rule: rule.clone(), times_used: 0 }))
                .collect()
        });

        Self {
            switch_id,
            name: switch_name(switch_id),
            delay: Ewma::new(alpha),
            queue: Ewma::new(alpha),
            last_alert: None,
            flows: FlowTracker::new(),
            rules,
            samples: 0,
        }
    }

    /// Id the switch reports in its traces.
    pub fn switch_id(&self) -> u16 {
        self.switch_id
    }

    /// Name of the switch, derived from its id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smoothed queueing delay, in microseconds.
    pub fn delay(&self) -> f64 {
        self.delay.value()
    }

    /// Smoothed queue depth, in packets.
    pub fn queue(&self) -> f64 {
        self.queue.value()
    }

    /// When the latest report for the switch was emitted.
    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Flows seen at the switch.
    pub fn flows(&self) -> &FlowTracker {
        &self.flows
    }

    /// Number of samples folded into the estimates.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// The rule `id` with its usage count, if the switch has a log containing it.
    pub fn rule(&self, id: RuleId) -> Option<&TrackedRule> {
        self.rules.as_ref()?.get(&id)
    }

    /// The switch's rules, by id.
    pub fn rules(&self) -> impl Iterator<Item = &TrackedRule> {
        self.rules.iter().flat_map(BTreeMap::values)
    }

    pub(crate) fn observe_flow(&mut self, source: Ipv4Addr, now: Instant) {
        self.flows.observe(source, now);
    }

    pub(crate) fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        self.flows.sweep(now, timeout)
    }

    /// Counts a use of rule `id`.
    pub(crate) fn use_rule(&mut self, id: RuleId) -> Result<(), DataIntegrityError> {
        let Some(rules) = self.rules.as_mut() else {
            return Err(DataIntegrityError::UnknownSwitch { switch_id: self.switch_id });
        };

        let tracked = rules
            .get_mut(&id)
            .ok_or_else(|| DataIntegrityError::UnknownRule { switch: self.name.clone(), rule: id })?;
        tracked.times_used += 1;

        Ok(())
    }

    pub(crate) fn update_estimates(&mut self, trace: &SwitchTrace) {
        self.delay.update(f64::from(trace.time_delta));
        self.queue.update(f64::from(trace.queue_depth));
        self.samples += 1;
    }

    /// Returns `true` and records the alert time if no alert was raised within `cooldown`.
    pub(crate) fn try_alert(&mut self, now: Instant, cooldown: Duration) -> bool {
        let ready = self
            .last_alert
            .map_or(true, |last| now.saturating_duration_since(last) >= cooldown);

        if ready {
            self.last_alert = Some(now);
        }

        ready
    }

    pub(crate) fn report(&self, trigger: SwitchTrace, now: Instant) -> CongestionReport {
        CongestionReport {
            switch: self.name.clone(),
            switch_id: self.switch_id,
            trigger,
            flows: self
                .flows
                .active()
                .map(|flow| FlowSummary { source: flow.source, age: flow.age(now), packets: flow.packets })
                .collect(),
            delay_us: self.delay(),
            queue_occupancy: self.queue(),
            rules: self.rules().cloned().collect(),
        }
    }
}
