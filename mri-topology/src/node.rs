use std::{fmt, net::Ipv4Addr};

use mri_common::{numeric_suffix, switch_name};

use crate::{Result, TopologyError};

/// A switch or host of the topology. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    kind: NodeKind,
}

/// What a [`Node`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An end host.
    Host(HostInfo),
    /// A programmable switch.
    Switch(SwitchInfo),
}

/// Attributes of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    /// The host's IPv4 address.
    pub address: Ipv4Addr,
}

/// Attributes of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchInfo {
    /// Numeric id, stamped by the switch into every telemetry trace.
    pub id: u16,
}

impl Node {
    /// Creates a switch. Its id is the numeric suffix of `name` (`s3` has id 3).
    ///
    /// The name must be the canonical name of its id: traces only carry the id, and the monitor
    /// finds a switch's rule log under that canonical name. `leaf1` and `s01` are rejected.
    pub fn switch(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let id = numeric_suffix(&name)
            .ok_or_else(|| invalid_name(&name, "switch names must end in a number"))?;
        let id = u16::try_from(id).map_err(|_| invalid_name(&name, "switch id exceeds 65535"))?;

        if name != switch_name(id) {
            return Err(invalid_name(&name, "switch names must be `s` followed by the id"));
        }

        Ok(Self { name, kind: NodeKind::Switch(SwitchInfo { id }) })
    }

    /// Creates a host whose address is derived from the numeric suffix of its name:
    /// `hN` gets `10.0.N.N`.
    pub fn host(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let n = numeric_suffix(&name)
            .ok_or_else(|| invalid_name(&name, "host names without an address must end in a number"))?;
        let n = u8::try_from(n)
            .map_err(|_| invalid_name(&name, "derived host addresses need a number below 256"))?;

        Ok(Self::host_with_address(name, Ipv4Addr::new(10, 0, n, n)))
    }

    /// Creates a host with an explicit address.
    pub fn host_with_address(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self { name: name.into(), kind: NodeKind::Host(HostInfo { address }) }
    }

    /// The node's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a host or a switch, with its attributes.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns `true` for switches.
    #[inline]
    pub fn is_switch(&self) -> bool {
        matches!(self.kind, NodeKind::Switch(_))
    }

    /// Returns `true` for hosts.
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self.kind, NodeKind::Host(_))
    }

    /// Returns the switch id, if this is a switch.
    pub fn switch_id(&self) -> Option<u16> {
        match self.kind {
            NodeKind::Switch(info) => Some(info.id),
            NodeKind::Host(_) => None,
        }
    }

    /// Returns the host address, if this is a host.
    pub fn host_address(&self) -> Option<Ipv4Addr> {
        match self.kind {
            NodeKind::Host(info) => Some(info.address),
            NodeKind::Switch(_) => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Switch(info) => write!(f, "{} (switch {})", self.name, info.id),
            NodeKind::Host(info) => write!(f, "{} (host {})", self.name, info.address),
        }
    }
}

fn invalid_name(name: &str, reason: &'static str) -> TopologyError {
    TopologyError::InvalidNodeName { name: name.to_owned(), reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_ids_come_from_names() {
        let s = Node::switch("s12").unwrap();
        assert_eq!(s.switch_id(), Some(12));
        assert!(s.is_switch());
        assert_eq!(s.host_address(), None);

        assert!(matches!(Node::switch("core"), Err(TopologyError::InvalidNodeName { .. })));
        assert!(matches!(Node::switch("s70000"), Err(TopologyError::InvalidNodeName { .. })));
    }

    #[test]
    fn switch_names_must_be_canonical() {
        for name in ["leaf1", "s01", "spine7", "S2"] {
            assert!(
                matches!(Node::switch(name), Err(TopologyError::InvalidNodeName { .. })),
                "{name} was accepted"
            );
        }
        assert_eq!(Node::switch("s0").unwrap().switch_id(), Some(0));
    }

    #[test]
    fn host_addresses_are_derived_or_explicit() {
        assert_eq!(Node::host("h1").unwrap().host_address(), Some(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(Node::host("h22").unwrap().host_address(), Some(Ipv4Addr::new(10, 0, 22, 22)));
        assert!(Node::host("h256").is_err());

        let h = Node::host_with_address("h11", Ipv4Addr::new(10, 0, 1, 11));
        assert!(h.is_host());
        assert_eq!(h.host_address(), Some(Ipv4Addr::new(10, 0, 1, 11)));
        assert_eq!(h.switch_id(), None);
    }
}
