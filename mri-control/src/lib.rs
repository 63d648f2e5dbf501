#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Pushing compiled forwarding state to switches.
//!
//! The switch control protocol sits behind the [`ControlPlane`] and [`Session`] traits.
//! [`RuleInstaller`] turns rules into table writes and keeps the per-switch rule log in step,
//! and [`deploy`] drives the whole installation sequence for every switch of a topology.

use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

mod deploy;
pub use deploy::{
    deploy, DeployOptions, DeploymentReport, SwitchOutcome, DEFAULT_ADDRESS, DEFAULT_BASE_PORT,
};

mod entry;
pub use entry::{ProgramDescriptor, TableEntry};

mod installer;
pub use installer::RuleInstaller;

pub mod recording;
pub use recording::RecordingControlPlane;

mod registry;
pub use registry::SessionRegistry;

pub use mri_topology::{Rule, RuleId};

/// A connection to the control plane of the switches.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// The session type this control plane opens.
    type Session: Session;

    /// Opens a session to the switch `switch`, listening on `address` with the given device id.
    async fn establish(
        &self,
        switch: &str,
        address: SocketAddr,
        device_id: u64,
    ) -> Result<Self::Session, ControlError>;
}

/// An open control session with one switch.
///
/// A session must claim mastership before it may change the switch, and the forwarding program
/// has to be set before table entries can be written.
#[async_trait::async_trait]
pub trait Session: Send + Sync + 'static {
    /// Name of the switch on the other end.
    fn switch(&self) -> &str;

    /// Becomes the primary controller of the switch.
    async fn claim_mastership(&self) -> Result<(), ControlError>;

    /// Loads `program` onto the switch, replacing any table state.
    async fn set_forwarding_program(&self, program: &ProgramDescriptor) -> Result<(), ControlError>;

    /// Inserts `entry` into its table.
    async fn write_table_entry(&self, entry: &TableEntry) -> Result<(), ControlError>;

    /// Reads every entry currently installed on the switch.
    async fn read_table_entries(&self) -> Result<Vec<TableEntry>, ControlError>;

    /// Releases the session. Further calls fail with [`ControlError::Closed`].
    async fn shutdown(&self) -> Result<(), ControlError>;
}

/// Errors returned by a [`ControlPlane`] session.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Transport failure.
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    /// The switch could not be reached.
    #[error("failed to connect to {switch} at {address}: {reason}")]
    Connect {
        /// Switch name.
        switch: String,
        /// Control plane address that was dialed.
        address: SocketAddr,
        /// Cause reported by the transport.
        reason: String,
    },
    /// A write was attempted before mastership was claimed.
    #[error("{0} is not controlled by this session, claim mastership first")]
    NotMaster(String),
    /// A table entry was written before a forwarding program was installed.
    #[error("{0} has no forwarding program")]
    NoProgram(String),
    /// One of the program files does not exist.
    #[error("forwarding program file not found: {0}")]
    MissingProgram(PathBuf),
    /// The switch refused the request.
    #[error("{switch} rejected the request: {reason}")]
    Rejected {
        /// Switch name.
        switch: String,
        /// Reason given by the switch.
        reason: String,
    },
    /// The session was shut down.
    #[error("session to {0} is closed")]
    Closed(String),
}

/// Errors raised while installing the rules of one switch.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Rules must be installed in id order.
    #[error("rule {found} installed out of order on {switch}, expected {expected}")]
    OutOfOrder {
        /// Switch name.
        switch: String,
        /// Number of rules installed so far.
        expected: usize,
        /// Id of the rule that was offered.
        found: RuleId,
    },
    /// The session failed while writing a rule.
    #[error("control plane error: {0}")]
    Control(#[from] ControlError),
    /// The rule was installed but could not be logged.
    #[error("rule log error: {0}")]
    Log(#[from] mri_wire::rulelog::Error),
}

/// Why the installation sequence of one switch stopped.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The switch's index pushes its control port past `u16::MAX`.
    #[error("{switch} has no port left for the control plane (index {index})")]
    AddressExhausted {
        /// Switch name.
        switch: String,
        /// Position of the switch in the topology.
        index: usize,
    },
    /// Connecting, claiming mastership or installing the program failed.
    #[error("control plane error: {0}")]
    Control(#[from] ControlError),
    /// A rule could not be installed or logged.
    #[error("install error: {0}")]
    Install(#[from] InstallError),
    /// The rule log of the switch could not be created.
    #[error("rule log error: {0}")]
    Log(#[from] mri_wire::rulelog::Error),
    /// The installation task panicked or was cancelled.
    #[error("installation task did not complete")]
    Incomplete,
}
