//! Rule synthesis.
//!
//! Addresses are derived from node ids:
//!
//! * switch `N` owns the subnet `10.<N_hi>.<N_lo>.0/24` (`10.0.N.0/24` for ids below 256),
//! * the link-layer address towards switch `N` is `00:00:<N_hi>:<N_lo>:00:00`,
//! * the link-layer address of host `a.b.c.d` behind switch `N` is `00:00:00:<N_hi>:<N_lo>:<d>`.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;

use crate::{Node, NodeKind, Rule, RuleId};

/// Prefix length of a switch's subnet.
const SUBNET_LEN: u8 = 24;


/// The subnet owned by switch `id`.
pub fn switch_subnet(id: u16) -> Ipv4Network {
    let [hi, lo] = id.to_be_bytes();
    let network = Ipv4Addr::new(10, hi, lo, 0);
    // `SUBNET_LEN` is a valid length, the host-route fallback is never taken.
    Ipv4Network::new(network, SUBNET_LEN).unwrap_or_else(|_| Ipv4Network::from(network))
}

/// The link-layer destination used when forwarding towards switch `id`.
pub fn switch_mac(id: u16) -> MacAddr {
    let [hi, lo] = id.to_be_bytes();
    MacAddr::new(0, 0, hi, lo, 0, 0)
}

/// The link-layer destination of host `address` attached to switch `switch_id`.
pub fn host_mac(switch_id: u16, address: Ipv4Addr) -> MacAddr {
    let [hi, lo] = switch_id.to_be_bytes();
    MacAddr::new(0, 0, 0, hi, lo, address.octets()[3])
}

/// Synthesizes the rule for a direct link out of switch `switch_id` towards `neighbor`.
pub fn direct(id: RuleId, switch_id: u16, neighbor: &Node, port: u16) -> Rule {
    match neighbor.kind() {
        NodeKind::Switch(info) => Rule {
            id,
            match_prefix: switch_subnet(info.id),
            dst_mac: switch_mac(info.id),
            port,
            last_hop: false,
        },
        NodeKind::Host(info) => Rule {
            id,
            match_prefix: Ipv4Network::from(info.address),
            dst_mac: host_mac(switch_id, info.address),
            port,
            last_hop: true,
        },
    }
}

/// Synthesizes the completion-pass rule towards switch `target`: the first hop's rule with its
/// match rewritten to the target's subnet. Never a last-hop rule.
pub fn indirect(id: RuleId, target: u16, first_hop: &Rule) -> Rule {
    Rule {
        id,
        match_prefix: switch_subnet(target),
        dst_mac: first_hop.dst_mac,
        port: first_hop.port,
        last_hop: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_rules_target_the_neighbor_subnet() {
        let s2 = Node::switch("s2").unwrap();
        let rule = direct(1, 1, &s2, 3);

        assert_eq!(rule.match_prefix.to_string(), "10.0.2.0/24");
        assert_eq!(rule.dst_mac.to_string(), "00:00:00:02:00:00");
        assert_eq!(rule.port, 3);
        assert!(!rule.last_hop);
    }

    #[test]
    fn host_rules_are_last_hop() {
        let h11 = Node::host_with_address("h11", Ipv4Addr::new(10, 0, 1, 11));
        let rule = direct(0, 1, &h11, 1);

        assert_eq!(rule.match_prefix.to_string(), "10.0.1.11/32");
        assert_eq!(rule.dst_mac.to_string(), "00:00:00:00:01:0b");
        assert!(rule.last_hop);
    }

    #[test]
    fn wide_switch_ids_spill_into_the_second_octet() {
        assert_eq!(switch_subnet(258).to_string(), "10.1.2.0/24");
        assert_eq!(switch_mac(258).to_string(), "00:00:01:02:00:00");
    }

    #[test]
    fn indirect_rules_only_rewrite_the_match() {
        let s2 = Node::switch("s2").unwrap();
        let first_hop = direct(1, 1, &s2, 2);
        let rule = indirect(4, 3, &first_hop);

        assert_eq!(rule.id, 4);
        assert_eq!(rule.match_prefix, switch_subnet(3));
        assert_eq!(rule.dst_mac, first_hop.dst_mac);
        assert_eq!(rule.port, first_hop.port);
        assert!(!rule.last_hop);
    }
}
