use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{ControlError, Rule};

/// The compiled forwarding program loaded onto every switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    /// Program metadata (tables, actions and their ids).
    pub p4info: PathBuf,
    /// Target-specific device configuration.
    pub device_config: PathBuf,
}

impl Default for ProgramDescriptor {
    fn default() -> Self {
        Self::new("./build/mri.p4info", "./build/mri.json")
    }
}

impl ProgramDescriptor {
    /// Creates a descriptor from the program metadata and device configuration paths.
    pub fn new(p4info: impl Into<PathBuf>, device_config: impl Into<PathBuf>) -> Self {
        Self { p4info: p4info.into(), device_config: device_config.into() }
    }

    /// Checks that both program files exist.
    pub fn check(&self) -> Result<(), ControlError> {
        for path in [&self.p4info, &self.device_config] {
            if !Path::new(path).exists() {
                return Err(ControlError::MissingProgram(path.clone()));
            }
        }

        Ok(())
    }
}

/// A table entry of the forwarding program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEntry {
    /// An entry of the ingress longest-prefix-match table.
    Ipv4Lpm(Rule),
    /// The default action of the egress telemetry table, which stamps `switch_id` into every
    /// trace the switch appends.
    Swtrace {
        /// Id the switch reports in its traces.
        switch_id: u16,
    },
}

impl TableEntry {
    /// Name of the forwarding table.
    pub const IPV4_LPM: &'static str = "MyIngress.ipv4_lpm";
    /// Name of the telemetry table.
    pub const SWTRACE: &'static str = "MyEgress.swtrace";

    /// Returns the name of the table the entry belongs to.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Ipv4Lpm(_) => Self::IPV4_LPM,
            Self::Swtrace { .. } => Self::SWTRACE,
        }
    }
}

impl From<Rule> for TableEntry {
    fn from(rule: Rule) -> Self {
        Self::Ipv4Lpm(rule)
    }
}

impl fmt::Display for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4Lpm(rule) => write!(
                f,
                "{}: hdr.ipv4.dstAddr {} -> MyIngress.ipv4_forward dstAddr {} port {}",
                self.table(),
                rule.match_prefix,
                rule.dst_mac,
                rule.port
            ),
            Self::Swtrace { switch_id } => {
                write!(f, "{}: (default) -> MyEgress.add_swtrace swid {}", self.table(), switch_id)
            }
        }
    }
}
