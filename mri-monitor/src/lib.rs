#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The telemetry side: decoding captured frames, tracking flows per switch and detecting
//! congestion.
//!
//! Every switch a packet traverses appends a [`SwitchTrace`](mri_wire::SwitchTrace) to it. The
//! [`CongestionMonitor`] folds each trace into the state of the switch that wrote it: the flow of
//! the packet's source, the usage count of the rule that forwarded it, and smoothed delay and
//! queue estimates. A trace above the configured thresholds raises a [`CongestionReport`], at
//! most once per cooldown per switch.

use std::io;

use thiserror::Error;

pub mod capture;

mod ewma;
pub use ewma::{Ewma, DEFAULT_ALPHA};

mod flow;
pub use flow::{Flow, FlowTracker};

mod monitor;
pub use monitor::CongestionMonitor;

mod options;
pub use options::{MonitorOptions, DEFAULT_INTERFACE, MIN_VERIFY_INTERVAL};

mod report;
pub use report::{CongestionReport, FlowSummary, TrackedRule};

mod rulebook;
pub use rulebook::RuleBook;

mod state;
pub use state::SwitchState;

mod stats;
pub use stats::MonitorStats;

use mri_wire::{rulelog, RuleId};

/// A trace refers to forwarding state the controller never installed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataIntegrityError {
    /// No rule log was loaded for the switch id carried in the trace.
    #[error("switch {switch_id} has no rule log")]
    UnknownSwitch {
        /// Id reported by the switch.
        switch_id: u16,
    },
    /// The trace names a rule id past the end of the switch's log.
    #[error("rule {rule} is not installed on {switch}")]
    UnknownRule {
        /// Name of the switch.
        switch: String,
        /// Offending rule id.
        rule: RuleId,
    },
}

/// Errors raised while loading or running a [`CongestionMonitor`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A trace could not be resolved against the rule logs.
    #[error("data integrity error: {0}")]
    Integrity(#[from] DataIntegrityError),
    /// A rule log could not be loaded.
    #[error("rule log error: {0}")]
    RuleLog(#[from] rulelog::Error),
}

/// Errors raised while opening a capture. See [`capture::open`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Opening the channel failed, usually for lack of privileges.
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    /// No interface with the given name exists.
    #[error("no such interface: {0}")]
    InterfaceNotFound(String),
    /// The interface is not an ethernet device.
    #[error("interface {0} does not provide an ethernet channel")]
    UnsupportedChannel(String),
}
