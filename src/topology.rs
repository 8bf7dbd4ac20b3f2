//! Topology graph of switches and learned hosts, and the discovery snapshot
//! it is rebuilt from on every mode transition.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::packet::MacAddr;

/// Cost of a path. Wide enough to hold a hop count and a full 64-bit
/// datapath id side by side.
pub type Weight = u128;

/// Weight of an edge when no tie-break priority applies.
pub const DEFAULT_WEIGHT: Weight = 1;

/// Base weight of an inter-switch edge under a tie-break policy. The priority
/// term added on top is a whole datapath id, below `1 << 64`, so hop count
/// dominates for any path shorter than 65536 hops.
const HOP_WEIGHT: Weight = 1 << 80;

/// Port recorded on the abstract host-to-switch back edge.
pub const HOST_BACK_PORT: u16 = 0;

/// A vertex of the topology graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Switch(u64),
    Host(MacAddr),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Node::Switch(id) => write!(f, "s{}", id),
            Node::Host(mac) => write!(f, "{}", mac),
        }
    }
}

/// A directed edge: the port to leave `from` on, and its cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub port: u16,
    pub weight: Weight,
}

/// How equal-hop-count paths are ranked. The policy is expressed purely
/// through the weights of inter-switch edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Every edge weighs `DEFAULT_WEIGHT`.
    HopCount,
    /// Entering a lower-numbered switch is cheaper.
    PreferLower,
    /// Entering a higher-numbered switch is cheaper.
    PreferHigher,
}

impl TieBreak {
    /// Weight of an edge entering switch `dst`.
    pub fn weight_to(self, dst: u64) -> Weight {
        match self {
            TieBreak::HopCount => DEFAULT_WEIGHT,
            TieBreak::PreferLower => HOP_WEIGHT + Weight::from(dst),
            TieBreak::PreferHigher => HOP_WEIGHT + Weight::from(u64::max_value() - dst),
        }
    }
}

impl Default for TieBreak {
    fn default() -> TieBreak {
        TieBreak::PreferLower
    }
}

impl FromStr for TieBreak {
    type Err = Error;

    fn from_str(s: &str) -> Result<TieBreak, Error> {
        match s {
            "hop-count" => Ok(TieBreak::HopCount),
            "prefer-lower" => Ok(TieBreak::PreferLower),
            "prefer-higher" => Ok(TieBreak::PreferHigher),
            _ => {
                Err(Error::Malformed {
                    what: "tie-break policy",
                    detail: s.to_string(),
                })
            }
        }
    }
}

/// A bidirectional link between two switch ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub src: u64,
    pub src_port: u16,
    pub dst: u64,
    pub dst_port: u16,
}

impl Link {
    pub fn new(src: u64, src_port: u16, dst: u64, dst_port: u16) -> Link {
        Link {
            src: src,
            src_port: src_port,
            dst: dst,
            dst_port: dst_port,
        }
    }

    /// The same link with the lower switch id first.
    pub fn normalized(self) -> Link {
        if self.src <= self.dst {
            self
        } else {
            Link::new(self.dst, self.dst_port, self.src, self.src_port)
        }
    }

    pub fn touches(&self, switch: u64) -> bool {
        self.src == switch || self.dst == switch
    }

    pub fn uses_port(&self, switch: u64, port: u16) -> bool {
        (self.src == switch && self.src_port == port) || (self.dst == switch && self.dst_port == port)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}-{}:{}", self.src, self.src_port, self.dst, self.dst_port)
    }
}

impl FromStr for Link {
    type Err = Error;

    /// Parse `<switch>:<port>-<switch>:<port>`.
    fn from_str(s: &str) -> Result<Link, Error> {
        fn end(s: &str) -> Option<(u64, u16)> {
            let mut parts = s.trim().splitn(2, ':');
            let sw = parts.next()?.parse().ok()?;
            let port = parts.next()?.parse().ok()?;
            Some((sw, port))
        }
        let invalid = || Error::InvalidLink(s.to_string());
        let mut sides = s.splitn(2, '-');
        let (src, src_port) = sides.next().and_then(end).ok_or_else(invalid)?;
        let (dst, dst_port) = sides.next().and_then(end).ok_or_else(invalid)?;
        if src == dst {
            return Err(invalid());
        }
        Ok(Link::new(src, src_port, dst, dst_port))
    }
}

/// Authoritative record of what discovery has reported: switches, links and
/// ports currently out of service. Survives mode transitions.
#[derive(Clone, Debug, Default)]
pub struct Discovery {
    switches: BTreeSet<u64>,
    links: BTreeSet<Link>,
    down_ports: BTreeSet<(u64, u16)>,
}

impl Discovery {
    pub fn new() -> Discovery {
        Discovery::default()
    }

    /// Record a switch. Returns `true` if it was not known before.
    pub fn switch_appeared(&mut self, switch: u64) -> bool {
        self.switches.insert(switch)
    }

    /// Record a link and both of its endpoints. Returns `true` if the link is new.
    pub fn link_discovered(&mut self, link: Link) -> bool {
        self.switches.insert(link.src);
        self.switches.insert(link.dst);
        self.links.insert(link.normalized())
    }

    /// Record whether a port can carry traffic. Returns `true` if that changed.
    pub fn set_port_up(&mut self, switch: u64, port: u16, up: bool) -> bool {
        if up {
            self.down_ports.remove(&(switch, port))
        } else {
            self.down_ports.insert((switch, port))
        }
    }

    pub fn port_up(&self, switch: u64, port: u16) -> bool {
        !self.down_ports.contains(&(switch, port))
    }

    /// A link carries traffic when the ports at both of its ends are up.
    pub fn link_up(&self, link: &Link) -> bool {
        self.port_up(link.src, link.src_port) && self.port_up(link.dst, link.dst_port)
    }

    pub fn switches(&self) -> impl Iterator<Item = u64> + '_ {
        self.switches.iter().cloned()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Links attached to `(switch, port)`.
    pub fn links_at(&self, switch: u64, port: u16) -> Vec<Link> {
        self.links.iter().filter(|l| l.uses_port(switch, port)).cloned().collect()
    }
}

/// Directed weighted graph over switches and hosts.
///
/// Adjacency is kept in ordered maps so that traversal order, and with it
/// path selection, is deterministic.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    adj: BTreeMap<Node, BTreeMap<Node, Edge>>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.adj.entry(node).or_insert_with(BTreeMap::new);
    }

    /// Add or replace the edge `from -> to`, creating either node as needed.
    pub fn add_edge(&mut self, from: Node, to: Node, port: u16, weight: Weight) {
        self.add_node(to);
        self.adj.entry(from).or_insert_with(BTreeMap::new).insert(to,
                                                                   Edge {
                                                                       port: port,
                                                                       weight: weight,
                                                                   });
    }

    pub fn has_node(&self, node: &Node) -> bool {
        self.adj.contains_key(node)
    }

    pub fn edge(&self, from: &Node, to: &Node) -> Option<&Edge> {
        self.adj.get(from).and_then(|out| out.get(to))
    }

    /// Outgoing edges of `node`, in node order.
    pub fn neighbors<'a>(&'a self, node: &Node) -> impl Iterator<Item = (&'a Node, &'a Edge)> + 'a {
        self.adj.get(node).into_iter().flat_map(|out| out.iter())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.adj.keys()
    }

    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(|out| out.len()).sum()
    }

    pub fn clear(&mut self) {
        self.adj.clear();
    }

    /// Attach a newly seen host to the switch port it was observed on: a
    /// `switch -> host` edge on `port` and an abstract `host -> switch` back
    /// edge. Returns `false`, leaving the graph untouched, if the host is
    /// already a node.
    pub fn learn_host(&mut self, switch: u64, port: u16, host: MacAddr) -> bool {
        let node = Node::Host(host);
        if self.has_node(&node) {
            return false;
        }
        self.add_edge(Node::Switch(switch), node, port, DEFAULT_WEIGHT);
        self.add_edge(node, Node::Switch(switch), HOST_BACK_PORT, DEFAULT_WEIGHT);
        true
    }

    /// Add both directions of `link`, each weighted by the switch it enters.
    pub fn add_link(&mut self, link: &Link, tie: TieBreak) {
        let (a, b) = (Node::Switch(link.src), Node::Switch(link.dst));
        self.add_edge(a, b, link.src_port, tie.weight_to(link.dst));
        self.add_edge(b, a, link.dst_port, tie.weight_to(link.src));
    }

    /// Remove both directions of `link`, keeping its endpoints.
    pub fn remove_link(&mut self, link: &Link) {
        let (a, b) = (Node::Switch(link.src), Node::Switch(link.dst));
        if let Some(out) = self.adj.get_mut(&a) {
            out.remove(&b);
        }
        if let Some(out) = self.adj.get_mut(&b) {
            out.remove(&a);
        }
    }

    /// Replace the whole graph with the switches and usable links of
    /// `discovery` that do not touch an `excluded` switch. Learned hosts are
    /// dropped.
    pub fn rebuild_from_discovery(&mut self,
                                  discovery: &Discovery,
                                  excluded: &BTreeSet<u64>,
                                  tie: TieBreak) {
        self.clear();
        for sw in discovery.switches().filter(|sw| !excluded.contains(sw)) {
            self.add_node(Node::Switch(sw));
        }
        for link in discovery.links() {
            if excluded.contains(&link.src) || excluded.contains(&link.dst) {
                continue;
            }
            if discovery.link_up(link) {
                self.add_link(link, tie);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::mac;

    fn two_switches() -> Discovery {
        let mut d = Discovery::new();
        d.link_discovered(Link::new(1, 2, 2, 1));
        d
    }

    #[test]
    fn learning_a_host_twice_changes_nothing() {
        let mut g = Graph::new();
        assert!(g.learn_host(1, 1, mac(1)));
        let edges = g.edge_count();
        assert!(!g.learn_host(1, 1, mac(1)));
        assert_eq!(g.edge_count(), edges);
        assert_eq!(g.edge(&Node::Switch(1), &Node::Host(mac(1))).unwrap().port, 1);
        assert_eq!(g.edge(&Node::Host(mac(1)), &Node::Switch(1)).unwrap().port,
                   HOST_BACK_PORT);
    }

    #[test]
    fn links_are_mirrored_with_their_own_ports() {
        let mut g = Graph::new();
        g.rebuild_from_discovery(&two_switches(), &BTreeSet::new(), TieBreak::HopCount);
        assert_eq!(g.edge(&Node::Switch(1), &Node::Switch(2)).unwrap().port, 2);
        assert_eq!(g.edge(&Node::Switch(2), &Node::Switch(1)).unwrap().port, 1);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn rebuild_drops_excluded_switches_and_hosts() {
        let mut g = Graph::new();
        let d = two_switches();
        g.rebuild_from_discovery(&d, &BTreeSet::new(), TieBreak::HopCount);
        g.learn_host(1, 1, mac(1));

        let excluded: BTreeSet<u64> = vec![2].into_iter().collect();
        g.rebuild_from_discovery(&d, &excluded, TieBreak::HopCount);
        assert!(g.has_node(&Node::Switch(1)));
        assert!(!g.has_node(&Node::Switch(2)));
        assert!(!g.has_node(&Node::Host(mac(1))));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn down_ports_keep_links_out_of_rebuilds() {
        let mut d = two_switches();
        assert!(d.set_port_up(2, 1, false));
        let mut g = Graph::new();
        g.rebuild_from_discovery(&d, &BTreeSet::new(), TieBreak::HopCount);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);

        assert!(d.set_port_up(2, 1, true));
        g.rebuild_from_discovery(&d, &BTreeSet::new(), TieBreak::HopCount);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn tie_break_weights_follow_destination_id() {
        assert!(TieBreak::PreferLower.weight_to(2) < TieBreak::PreferLower.weight_to(3));
        assert!(TieBreak::PreferHigher.weight_to(2) > TieBreak::PreferHigher.weight_to(3));
        assert_eq!(TieBreak::HopCount.weight_to(7), DEFAULT_WEIGHT);
        // one extra hop always costs more than any priority difference
        assert!(2 * TieBreak::PreferLower.weight_to(u64::max_value()) <
                3 * TieBreak::PreferLower.weight_to(0));
    }

    #[test]
    fn mac_derived_datapath_ids_keep_their_order() {
        let (a, b) = (0x0000_0204_0000_0001, 0x0000_0204_0000_0002);
        assert!(TieBreak::PreferLower.weight_to(a) < TieBreak::PreferLower.weight_to(b));
        assert!(TieBreak::PreferHigher.weight_to(a) > TieBreak::PreferHigher.weight_to(b));
        assert!(TieBreak::PreferLower.weight_to(0x10000) <
                TieBreak::PreferLower.weight_to(0x20000));
    }

    #[test]
    fn links_parse_and_normalize() {
        let link: Link = "10:3-2:2".parse().unwrap();
        assert_eq!(link, Link::new(10, 3, 2, 2));
        assert_eq!(link.normalized(), Link::new(2, 2, 10, 3));
        assert_eq!(link.to_string(), "10:3-2:2");
        assert!("1:2-1:3".parse::<Link>().is_err());
        assert!("1-2".parse::<Link>().is_err());

        let mut d = Discovery::new();
        assert!(d.link_discovered(link));
        assert!(!d.link_discovered(Link::new(2, 2, 10, 3)));
        assert_eq!(d.links_at(10, 3), vec![Link::new(2, 2, 10, 3)]);
    }
}
