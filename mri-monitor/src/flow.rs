use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

/// Traffic from one source seen at one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Source address of the flow's packets.
    pub source: Ipv4Addr,
    /// When the first packet was seen.
    pub first_seen: Instant,
    /// When the latest packet was seen.
    pub last_seen: Instant,
    /// Packets seen since the flow was created.
    pub packets: u64,
    /// Whether the flow sent a packet within the activity window.
    pub active: bool,
}

impl Flow {
    fn new(source: Ipv4Addr, now: Instant) -> Self {
        Self { source, first_seen: now, last_seen: now, packets: 0, active: false }
    }

    /// Time since the flow was first seen.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen)
    }
}

/// The flows of one switch, keyed by source address.
///
/// A packet is the only thing that activates a flow, and [`FlowTracker::sweep`] is the only thing
/// that deactivates it.
#[derive(Debug, Clone, Default)]
pub struct FlowTracker {
    flows: BTreeMap<Ipv4Addr, Flow>,
}

impl FlowTracker {
    /// Creates a tracker with no flows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a packet from `source`, creating the flow on first sight.
    pub fn observe(&mut self, source: Ipv4Addr, now: Instant) -> &Flow {
        let flow = self.flows.entry(source).or_insert_with(|| Flow::new(source, now));

        flow.packets += 1;
        flow.last_seen = now;
        flow.active = true;

        flow
    }

    /// Deactivates every active flow idle for longer than `timeout`. Returns how many were
    /// deactivated.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut deactivated = 0;

        for flow in self.flows.values_mut().filter(|flow| flow.active) {
            if now.saturating_duration_since(flow.last_seen) > timeout {
                flow.active = false;
                deactivated += 1;
            }
        }

        deactivated
    }

    /// The flow of `source`, active or not.
    pub fn get(&self, source: Ipv4Addr) -> Option<&Flow> {
        self.flows.get(&source)
    }

    /// Active flows, by source address.
    pub fn active(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values().filter(|flow| flow.active)
    }

    /// Number of flows, including inactive ones.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns `true` if no flow was ever seen.
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
