use std::{fs, path::Path};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::{CompletionReport, Node, Result, TopologyError, TopologyGraph};

/// The declarative topology file.
///
/// ```json
/// {
///     "switches": ["s1", "s2"],
///     "hosts": ["h1", { "name": "h11", "ip": "10.0.1.11/24" }],
///     "links": [["s1", "h1"], ["s1", "h11"], ["s1", "s2"]]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescription {
    /// Switch names, `s` followed by the id.
    pub switches: Vec<String>,
    /// Hosts attached to the switches.
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    /// Undirected links, declared in both directions.
    #[serde(default)]
    pub links: Vec<[String; 2]>,
}

/// A host, either by name alone (address derived from the name) or with an explicit address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostEntry {
    /// A host addressed after the number its name ends in.
    Name(String),
    /// A host with an explicit address. The prefix length is ignored.
    Addressed {
        /// Host name.
        name: String,
        /// Host address.
        ip: Ipv4Network,
    },
}

impl HostEntry {
    /// The host's name.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Addressed { name, .. } => name,
        }
    }

    fn to_node(&self) -> Result<Node> {
        match self {
            Self::Name(name) => Node::host(name.as_str()),
            Self::Addressed { name, ip } => Ok(Node::host_with_address(name.as_str(), ip.ip())),
        }
    }
}

impl TopologyDescription {
    /// Reads a description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parses a description from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the graph with every direct link declared, without running the completion pass.
    ///
    /// Switches are processed in name order. Each switch numbers its neighbors from port 1, in
    /// the order the links naming it were declared. A link between two switches is therefore
    /// declared once from each side, each with its own port.
    pub fn build(&self) -> Result<TopologyGraph> {
        let mut graph = TopologyGraph::new();

        for name in &self.switches {
            graph.add_node(Node::switch(name.as_str())?)?;
        }
        for host in &self.hosts {
            graph.add_node(host.to_node()?)?;
        }

        // Reject bad links before any of them synthesizes a rule.
        for [a, b] in &self.links {
            if graph.node(a)?.is_host() && graph.node(b)?.is_host() {
                return Err(TopologyError::InvalidLink {
                    a: a.clone(),
                    b: b.clone(),
                    reason: "hosts can only attach to switches",
                });
            }
        }

        let mut switches: Vec<&str> = self.switches.iter().map(String::as_str).collect();
        switches.sort_unstable();

        for switch in switches {
            let neighbors = self.links.iter().filter_map(|[a, b]| {
                if a == switch {
                    Some(b.as_str())
                } else if b == switch {
                    Some(a.as_str())
                } else {
                    None
                }
            });

            let mut port = 0u16;
            for neighbor in neighbors {
                if graph.has_link(switch, neighbor) {
                    tracing::debug!(%switch, %neighbor, "Skipping repeated link");
                    continue;
                }

                port += 1;
                graph.add_link(switch, neighbor, port)?;
            }
        }

        tracing::info!(
            switches = graph.switches().count(),
            hosts = graph.hosts().count(),
            links = self.links.len(),
            "Built topology"
        );

        Ok(graph)
    }

    /// Builds the graph and runs the completion pass.
    pub fn compile(&self) -> Result<(TopologyGraph, CompletionReport)> {
        let mut graph = self.build()?;
        let report = graph.fill_tables()?;
        Ok((graph, report))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::rules;

    const MESH: &str = r#"{
        "switches": ["s1", "s2", "s3"],
        "hosts": ["h1", "h2"],
        "links": [["s1", "h1"], ["s1", "s2"], ["s1", "s3"], ["s2", "h2"], ["s2", "s3"]]
    }"#;

    #[test]
    fn full_mesh_needs_no_completion() {
        let (graph, report) = TopologyDescription::from_json(MESH).unwrap().compile().unwrap();

        assert!(report.is_complete());
        assert!(report.synthesized.is_empty());

        let s1 = graph.rules("s1");
        assert_eq!(s1.len(), 3);

        assert_eq!(s1[0].match_prefix.to_string(), "10.0.1.1/32");
        assert_eq!(s1[0].port, 1);
        assert!(s1[0].last_hop);

        assert_eq!(s1[1].match_prefix.to_string(), "10.0.2.0/24");
        assert_eq!(s1[1].dst_mac, rules::switch_mac(2));
        assert_eq!(s1[1].port, 2);
        assert!(!s1[1].last_hop);

        // s2 sees s1 first, then h2, then s3.
        let ports: Vec<_> = graph.links_from("s2").iter().map(|l| (l.to.as_str(), l.port)).collect();
        assert_eq!(ports, [("s1", 1), ("h2", 2), ("s3", 3)]);
    }

    #[test]
    fn missing_link_is_completed_through_a_neighbor() {
        let mut description = TopologyDescription::from_json(MESH).unwrap();
        description.links.retain(|[a, b]| !(a == "s1" && b == "s3"));

        let (graph, report) = description.compile().unwrap();
        assert!(report.is_complete());
        assert_eq!(report.synthesized.len(), 2);

        let towards_s3 = graph.lookup("s1", Ipv4Addr::new(10, 0, 3, 3)).unwrap();
        let towards_s2 = &graph.rules("s1")[1];
        assert_eq!(towards_s3.match_prefix, rules::switch_subnet(3));
        assert_eq!(towards_s3.port, towards_s2.port);
        assert_eq!(towards_s3.dst_mac, towards_s2.dst_mac);
        assert!(!towards_s3.last_hop);

        let towards_s1 = graph.lookup("s3", Ipv4Addr::new(10, 0, 1, 1)).unwrap();
        assert_eq!(towards_s1.match_prefix, rules::switch_subnet(1));
        assert_eq!(graph.trace_route("s3", "s1").unwrap(), ["s3", "s2", "s1"]);
    }

    #[test]
    fn hosts_may_carry_explicit_addresses() {
        let description = TopologyDescription::from_json(
            r#"{
                "switches": ["s1"],
                "hosts": [{ "name": "h11", "ip": "10.0.1.11/24" }],
                "links": [["h11", "s1"]]
            }"#,
        )
        .unwrap();

        let graph = description.build().unwrap();
        let rule = &graph.rules("s1")[0];
        assert_eq!(rule.match_prefix.to_string(), "10.0.1.11/32");
        assert_eq!(rule.dst_mac.to_string(), "00:00:00:00:01:0b");
    }

    #[test]
    fn repeated_links_are_declared_once() {
        let description = TopologyDescription::from_json(
            r#"{ "switches": ["s1", "s2"], "links": [["s1", "s2"], ["s2", "s1"]] }"#,
        )
        .unwrap();

        let graph = description.build().unwrap();
        assert_eq!(graph.links_from("s1").len(), 1);
        assert_eq!(graph.links_from("s2").len(), 1);
    }

    #[test]
    fn bad_links_fail_before_any_rule_is_synthesized() {
        let host_to_host = TopologyDescription::from_json(
            r#"{ "switches": ["s1"], "hosts": ["h1", "h2"], "links": [["s1", "h1"], ["h1", "h2"]] }"#,
        )
        .unwrap();
        assert!(matches!(host_to_host.build(), Err(TopologyError::InvalidLink { .. })));

        let unknown = TopologyDescription::from_json(
            r#"{ "switches": ["s1"], "links": [["s1", "h9"]] }"#,
        )
        .unwrap();
        assert!(matches!(unknown.build(), Err(TopologyError::UnknownNode(name)) if name == "h9"));
    }

    #[test]
    fn descriptions_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(&path, MESH).unwrap();

        let description = TopologyDescription::load(&path).unwrap();
        assert_eq!(description.switches, ["s1", "s2", "s3"]);
        assert_eq!(description.hosts[1], HostEntry::Name("h2".to_owned()));

        assert!(matches!(
            TopologyDescription::load(dir.path().join("missing.json")),
            Err(TopologyError::Io(_))
        ));
        assert!(matches!(TopologyDescription::from_json("{"), Err(TopologyError::Json(_))));
    }
}
