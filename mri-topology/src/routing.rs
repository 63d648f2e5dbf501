//! Reachability: BFS next hops and the completion pass.

use std::{
    collections::{BTreeMap, VecDeque},
    net::Ipv4Addr,
};

use rustc_hash::FxHashSet;

use crate::{rules, Link, Result, Rule, RuleId, TopologyError, TopologyGraph};

/// A rule added by the completion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectRule {
    /// Switch the rule was installed on.
    pub from: String,
    /// Switch whose subnet the rule matches.
    pub to: String,
    /// Id of the new rule in `from`'s table.
    pub rule: RuleId,
    /// Egress port reused from the first hop towards `to`.
    pub port: u16,
}

/// Outcome of [`TopologyGraph::fill_tables`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Rules synthesized for switch pairs without a direct link.
    pub synthesized: Vec<IndirectRule>,
    /// Ordered switch pairs with no path between them.
    pub unreachable: Vec<(String, String)>,
}

impl CompletionReport {
    /// Whether every switch can reach every other switch.
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }
}

impl TopologyGraph {
    /// Computes, for every switch reachable from `source`, the rule used on the first hop out of
    /// `source` towards it.
    ///
    /// Breadth-first over switch-to-switch links. The first link that discovers a switch wins,
    /// so ties are broken by declaration order. Unreachable switches have no entry.
    pub fn next_hop_for(&self, source: &str) -> Result<BTreeMap<String, Rule>> {
        if !self.node(source)?.is_switch() {
            return Err(TopologyError::NotASwitch(source.to_owned()));
        }

        let table = self.rules(source);
        let mut next_hops = BTreeMap::new();
        let mut visited = FxHashSet::default();
        visited.insert(source);

        // (switch, id of the rule on source that leads towards it)
        let mut queue: VecDeque<(&str, RuleId)> = VecDeque::new();
        for link in self.switch_links(source) {
            if visited.insert(link.to.as_str()) {
                queue.push_back((&link.to, link.rule));
            }
        }

        while let Some((current, first_hop)) = queue.pop_front() {
            if let Some(rule) = table.get(first_hop as usize) {
                next_hops.insert(current.to_owned(), rule.clone());
            }

            for link in self.switch_links(current) {
                if visited.insert(link.to.as_str()) {
                    queue.push_back((&link.to, first_hop));
                }
            }
        }

        Ok(next_hops)
    }

    /// The completion pass: for every ordered pair of distinct switches without a direct link,
    /// installs on the first switch a copy of its next-hop rule towards the second, matching the
    /// second switch's subnet.
    ///
    /// Must run once, after every link is declared; the graph refuses new links afterwards.
    /// Pairs without a path are reported, not treated as errors.
    pub fn fill_tables(&mut self) -> Result<CompletionReport> {
        if self.is_sealed() {
            return Err(TopologyError::AlreadyCompleted);
        }

        let switches: Vec<(String, u16)> = self
            .switches()
            .filter_map(|node| Some((node.name().to_owned(), node.switch_id()?)))
            .collect();

        let mut report = CompletionReport::default();

        for (from, _) in &switches {
            let next_hops = self.next_hop_for(from)?;

            for (to, to_id) in &switches {
                if from == to || self.has_link(from, to) {
                    continue;
                }

                let Some(first_hop) = next_hops.get(to) else {
                    tracing::warn!(%from, %to, "No path between switches");
                    report.unreachable.push((from.clone(), to.clone()));
                    continue;
                };

                let rule = self.push_rule(from, |id| rules::indirect(id, *to_id, first_hop))?;
                tracing::debug!(%from, %to, rule, port = first_hop.port, "Synthesized indirect rule");

                report.synthesized.push(IndirectRule {
                    from: from.clone(),
                    to: to.clone(),
                    rule,
                    port: first_hop.port,
                });
            }
        }

        self.seal();

        tracing::info!(
            synthesized = report.synthesized.len(),
            unreachable = report.unreachable.len(),
            "Completed routing tables"
        );

        Ok(report)
    }

    /// Longest-prefix match of `destination` in `switch`'s table.
    pub fn lookup(&self, switch: &str, destination: Ipv4Addr) -> Option<&Rule> {
        self.rules(switch)
            .iter()
            .filter(|rule| rule.match_prefix.contains(destination))
            .max_by_key(|rule| rule.match_prefix.prefix())
    }

    /// Follows the installed rules from switch `from` towards the subnet of switch `to`,
    /// returning the switches visited (both ends included), or `None` if the rules do not lead
    /// there.
    pub fn trace_route(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let target = self.node(to).ok()?.switch_id()?;
        let destination = rules::switch_subnet(target).network();

        let mut path = vec![from.to_owned()];
        let mut current = from;

        // A loop-free path visits each switch at most once.
        for _ in 0..self.switches().count() {
            if current == to {
                return Some(path);
            }

            let rule = self.lookup(current, destination)?;
            let link = self.links_from(current).iter().find(|link| link.port == rule.port)?;

            current = &link.to;
            path.push(current.to_owned());
        }

        (current == to).then_some(path)
    }

    /// Links out of `name` that lead to another switch.
    fn switch_links<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links_from(name)
            .iter()
            .filter(|link| self.node(&link.to).map(|node| node.is_switch()).unwrap_or(false))
    }
}
