use std::{fmt, net::Ipv4Addr, time::Duration};

use mri_wire::{RuleRecord, SwitchTrace};

/// A forwarding rule with the number of traces that referenced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRule {
    /// The rule as logged by the controller.
    pub rule: RuleRecord,
    /// Traces that named the rule.
    pub times_used: u64,
}

/// An active flow at the time of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSummary {
    /// Source address.
    pub source: Ipv4Addr,
    /// Time since the flow was first seen.
    pub age: Duration,
    /// Packets seen.
    pub packets: u64,
}

/// Emitted when a switch reports a queue or delay above threshold, at most once per cooldown
/// per switch.
#[derive(Debug, Clone, PartialEq)]
pub struct CongestionReport {
    /// Name of the congested switch.
    pub switch: String,
    /// Id the switch reports in its traces.
    pub switch_id: u16,
    /// The sample that crossed a threshold.
    pub trigger: SwitchTrace,
    /// Flows active at the switch, by source address.
    pub flows: Vec<FlowSummary>,
    /// Smoothed queueing delay, in microseconds.
    pub delay_us: f64,
    /// Smoothed queue depth, in packets.
    pub queue_occupancy: f64,
    /// The switch's rules, by id.
    pub rules: Vec<TrackedRule>,
}

impl CongestionReport {
    /// Smoothed queueing delay, in milliseconds.
    pub fn delay_ms(&self) -> f64 {
        self.delay_us / 1_000.0
    }
}

impl fmt::Display for CongestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========================  CONGESTION REPORT  ========================")?;
        writeln!(f, "Congestion on switch {} caused by the following flows", self.switch)?;
        for flow in &self.flows {
            writeln!(
                f,
                "\tFlow from {} started {:.2} seconds ago -> {} packets",
                flow.source,
                flow.age.as_secs_f64(),
                flow.packets
            )?;
        }
        writeln!(f, "This congestion is causing an average delay of {:.3}ms", self.delay_ms())?;
        writeln!(f, "The queue occupancy of this switch is {:.2} packets", self.queue_occupancy)?;
        write!(f, "The forwarding rules of this switch are:")?;
        for tracked in &self.rules {
            let rule = &tracked.rule;
            write!(
                f,
                "\n\tRule {}) {} => port {} (used {} times)",
                rule.id, rule.match_prefix, rule.port, tracked.times_used
            )?;
        }

        Ok(())
    }
}
