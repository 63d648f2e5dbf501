#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Topology model and forwarding rule compiler.
//!
//! A [`TopologyGraph`] holds switches, hosts and the directed links between them. Declaring a
//! link out of a switch synthesizes the forwarding rule for it right away. Once every link is
//! declared, [`TopologyGraph::fill_tables`] adds indirect rules so that every switch can reach
//! every other switch it has a path to.

use std::io;

use thiserror::Error;

mod description;
mod graph;
mod node;
mod routing;
pub mod rules;

pub use description::{HostEntry, TopologyDescription};
pub use graph::{Link, TopologyGraph};
pub use node::{HostInfo, Node, NodeKind, SwitchInfo};
pub use routing::{CompletionReport, IndirectRule};

/// A forwarding rule, exactly as it is installed and logged.
pub use mri_wire::RuleRecord as Rule;
pub use mri_wire::RuleId;

/// Errors raised while building a topology or compiling its tables.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A node with this name was already added.
    #[error("node already exists: {0}")]
    DuplicateNode(String),
    /// A link or lookup names a node that was never added.
    #[error("unknown node: {0}")]
    UnknownNode(String),
    /// The link cannot exist, e.g. a self-loop or a host-to-host link.
    #[error("invalid link {a} <-> {b}: {reason}")]
    InvalidLink {
        /// First endpoint.
        a: String,
        /// Second endpoint.
        b: String,
        /// What is wrong with the link.
        reason: &'static str,
    },
    /// The directed link was declared twice.
    #[error("link {from} -> {to} already declared")]
    DuplicateLink {
        /// Switch the link leaves.
        from: String,
        /// Node the link reaches.
        to: String,
    },
    /// The egress port is taken by another link.
    #[error("port {port} already in use on {switch}")]
    PortInUse {
        /// Switch name.
        switch: String,
        /// The taken port.
        port: u16,
    },
    /// No switch id or host address can be derived from the name.
    #[error("invalid node name {name}: {reason}")]
    InvalidNodeName {
        /// The rejected name.
        name: String,
        /// Which rule the name breaks.
        reason: &'static str,
    },
    /// The node exists but is a host.
    #[error("{0} is not a switch")]
    NotASwitch(String),
    /// The switch already holds as many rules as a rule id can number.
    #[error("rule table of {0} is full")]
    TableFull(String),
    /// A link was declared after the completion pass.
    #[error("routing tables already completed, cannot declare {from} -> {to}")]
    Sealed {
        /// Switch the link leaves.
        from: String,
        /// Node the link reaches.
        to: String,
    },
    /// The completion pass already ran.
    #[error("routing tables already completed")]
    AlreadyCompleted,
    /// The description file could not be read.
    #[error("failed to read topology description: {0}")]
    Io(#[from] io::Error),
    /// The description file is not valid JSON or misses a field.
    #[error("malformed topology description: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias of this crate.
pub type Result<T> = std::result::Result<T, TopologyError>;
