use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{rules, Node, Result, Rule, RuleId, TopologyError};

/// A directed link out of a switch, together with the rule it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Switch the link leaves.
    pub from: String,
    /// Node the link reaches.
    pub to: String,
    /// Egress port on `from`.
    pub port: u16,
    /// Id of the rule synthesized for this link in `from`'s table.
    pub rule: RuleId,
}

/// Switches, hosts and the directed links between them, plus every switch's rule table.
///
/// Nodes are kept in name order so that every traversal is deterministic. Links out of a
/// node keep their declaration order, which is the BFS tie-break.
#[derive(Debug, Default)]
pub struct TopologyGraph {
    nodes: BTreeMap<String, Node>,
    /// Switch id -> switch name.
    switch_ids: FxHashMap<u16, String>,
    /// Outgoing links per switch, in declaration order.
    links: FxHashMap<String, Vec<Link>>,
    /// Rule table per switch, ordered by id.
    tables: FxHashMap<String, Vec<Rule>>,
    /// Set once the completion pass has run.
    sealed: bool,
}

impl TopologyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. Fails if the name is taken. Switch names are canonical, so a switch's
    /// numeric id is taken exactly when its name is.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(node.name()) {
            return Err(TopologyError::DuplicateNode(node.name().to_owned()));
        }

        if let Some(id) = node.switch_id() {
            self.switch_ids.insert(id, node.name().to_owned());
            self.tables.insert(node.name().to_owned(), Vec::new());
        }

        tracing::debug!(node = %node, "Added node");
        self.nodes.insert(node.name().to_owned(), node);
        Ok(())
    }

    /// Declares a link between `a` and `b` leaving through `port`.
    ///
    /// The link is recorded from the switch's side: if only one endpoint is a switch, that
    /// switch owns the link; if both are, `a` does and the reverse direction has to be declared
    /// on its own. The rule for the link is synthesized and appended to the owner's table
    /// right away. Returns the id of that rule.
    pub fn add_link(&mut self, a: &str, b: &str, port: u16) -> Result<RuleId> {
        let node_a = self.node(a)?;
        let node_b = self.node(b)?;

        if a == b {
            return Err(invalid_link(a, b, "a node cannot link to itself"));
        }
        if node_a.is_host() && node_b.is_host() {
            return Err(invalid_link(a, b, "hosts can only attach to switches"));
        }

        let (switch, neighbor) = if node_a.is_switch() { (node_a, node_b) } else { (node_b, node_a) };
        let (from, to) = (switch.name().to_owned(), neighbor.name().to_owned());

        if self.sealed {
            return Err(TopologyError::Sealed { from, to });
        }
        if self.has_link(&from, &to) {
            return Err(TopologyError::DuplicateLink { from, to });
        }

        let links = self.links.get(&from).map(Vec::as_slice).unwrap_or_default();
        if links.iter().any(|link| link.port == port) {
            return Err(TopologyError::PortInUse { switch: from, port });
        }

        let switch_id = switch.switch_id().ok_or_else(|| TopologyError::NotASwitch(from.clone()))?;
        let table = self.tables.get(&from).map(Vec::len).unwrap_or_default();
        let id = RuleId::try_from(table).map_err(|_| TopologyError::TableFull(from.clone()))?;

        let rule = rules::direct(id, switch_id, neighbor, port);
        tracing::debug!(%from, %to, port, rule = id, prefix = %rule.match_prefix, "Declared link");

        self.tables.entry(from.clone()).or_default().push(rule);
        self.links.entry(from.clone()).or_default().push(Link { from, to, port, rule: id });

        Ok(id)
    }

    /// Whether a directed link `from -> to` has been declared.
    pub fn has_link(&self, from: &str, to: &str) -> bool {
        self.links_from(from).iter().any(|link| link.to == to)
    }

    /// Returns the node called `name`.
    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes.get(name).ok_or_else(|| TopologyError::UnknownNode(name.to_owned()))
    }

    /// All nodes, in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All switches, in name order.
    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_switch())
    }

    /// All hosts, in name order.
    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_host())
    }

    /// Returns the name of the switch with numeric id `id`.
    pub fn switch_by_id(&self, id: u16) -> Option<&str> {
        self.switch_ids.get(&id).map(String::as_str)
    }

    /// Links out of `name`, in declaration order.
    pub fn links_from(&self, name: &str) -> &[Link] {
        self.links.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// The rule table of switch `name`, ordered by id. Empty for hosts and unknown names.
    pub fn rules(&self, name: &str) -> &[Rule] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether the completion pass has run. No links can be declared afterwards.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Appends a rule to `switch`'s table, assigning it the next id.
    pub(crate) fn push_rule(&mut self, switch: &str, build: impl FnOnce(RuleId) -> Rule) -> Result<RuleId> {
        let table = self.tables.get_mut(switch).ok_or_else(|| TopologyError::NotASwitch(switch.to_owned()))?;
        let id = RuleId::try_from(table.len()).map_err(|_| TopologyError::TableFull(switch.to_owned()))?;

        table.push(build(id));
        Ok(id)
    }
}

fn invalid_link(a: &str, b: &str, reason: &'static str) -> TopologyError {
    TopologyError::InvalidLink { a: a.to_owned(), b: b.to_owned(), reason }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn graph(switches: &[&str], hosts: &[&str]) -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for s in switches {
            graph.add_node(Node::switch(*s).unwrap()).unwrap();
        }
        for h in hosts {
            graph.add_node(Node::host(*h).unwrap()).unwrap();
        }
        graph
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let mut graph = graph(&["s1"], &["h1"]);

        assert!(matches!(
            graph.add_node(Node::switch("s1").unwrap()),
            Err(TopologyError::DuplicateNode(name)) if name == "s1"
        ));
        assert!(matches!(
            graph.add_node(Node::host_with_address("h1", Ipv4Addr::new(10, 0, 0, 1))),
            Err(TopologyError::DuplicateNode(_))
        ));
    }

    #[test]
    fn links_need_known_endpoints() {
        let mut graph = graph(&["s1"], &[]);

        assert!(matches!(
            graph.add_link("s1", "s9", 1),
            Err(TopologyError::UnknownNode(name)) if name == "s9"
        ));
        assert!(matches!(graph.add_link("h1", "s1", 1), Err(TopologyError::UnknownNode(_))));
    }

    #[test]
    fn host_to_host_links_are_invalid() {
        let mut graph = graph(&[], &["h1", "h2"]);

        assert!(matches!(graph.add_link("h1", "h2", 1), Err(TopologyError::InvalidLink { .. })));
    }

    #[test]
    fn links_are_recorded_from_the_switch_side() {
        let mut graph = graph(&["s1"], &["h1"]);

        let id = graph.add_link("h1", "s1", 1).unwrap();
        assert_eq!(id, 0);
        assert!(graph.has_link("s1", "h1"));
        assert!(!graph.has_link("h1", "s1"));

        let rule = &graph.rules("s1")[0];
        assert!(rule.last_hop);
        assert_eq!(rule.match_prefix.to_string(), "10.0.1.1/32");
    }

    #[test]
    fn switch_links_are_directional() {
        let mut graph = graph(&["s1", "s2"], &[]);

        graph.add_link("s1", "s2", 2).unwrap();
        assert!(graph.has_link("s1", "s2"));
        assert!(!graph.has_link("s2", "s1"));

        graph.add_link("s2", "s1", 5).unwrap();
        assert!(graph.has_link("s2", "s1"));
        assert_eq!(graph.links_from("s2")[0].port, 5);
    }

    #[test]
    fn ports_and_pairs_are_unique() {
        let mut graph = graph(&["s1", "s2", "s3"], &[]);
        graph.add_link("s1", "s2", 1).unwrap();

        assert!(matches!(
            graph.add_link("s1", "s3", 1),
            Err(TopologyError::PortInUse { port: 1, .. })
        ));
        assert!(matches!(
            graph.add_link("s1", "s2", 2),
            Err(TopologyError::DuplicateLink { .. })
        ));
        // Neither failure touched the table.
        assert_eq!(graph.rules("s1").len(), 1);
    }

    #[test]
    fn rule_ids_are_dense_per_switch() {
        let mut graph = graph(&["s1", "s2", "s3"], &["h1", "h3"]);

        assert_eq!(graph.add_link("s1", "h1", 1).unwrap(), 0);
        assert_eq!(graph.add_link("s3", "h3", 1).unwrap(), 0);
        assert_eq!(graph.add_link("s1", "s2", 2).unwrap(), 1);
        assert_eq!(graph.add_link("s1", "s3", 3).unwrap(), 2);

        let ids: Vec<_> = graph.rules("s1").iter().map(|rule| rule.id).collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn switches_are_listed_in_name_order() {
        let graph = graph(&["s3", "s1", "s2"], &["h1"]);

        let names: Vec<_> = graph.switches().map(Node::name).collect();
        assert_eq!(names, ["s1", "s2", "s3"]);
        assert_eq!(graph.switch_by_id(2), Some("s2"));
        assert_eq!(graph.hosts().count(), 1);
    }
}
