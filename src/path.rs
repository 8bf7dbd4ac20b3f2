//! Least-cost path resolution over the topology graph.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use crate::topology::{Graph, Node, Weight};

/// First step of a resolved path: the neighbor to hand the frame to and the
/// port leading there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextHop {
    pub node: Node,
    pub port: u16,
}

/// Dijkstra from `source` to `destination`, returning the first hop of a
/// minimum-weight path, or `None` when `destination` is unreachable (or is
/// `source` itself).
///
/// Hosts are leaves: paths may end at a host but never pass through one.
/// Among equal-cost paths the one found first in `(distance, node)` order
/// wins, so the result only depends on the graph and its weights.
pub fn resolve(graph: &Graph, source: &Node, destination: &Node) -> Option<NextHop> {
    if source == destination || !graph.has_node(source) || !graph.has_node(destination) {
        return None;
    }

    let mut dist: BTreeMap<Node, Weight> = BTreeMap::new();
    let mut first_hop: BTreeMap<Node, NextHop> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(*source, 0);
    heap.push(Reverse((0 as Weight, *source)));

    while let Some(Reverse((d, node))) = heap.pop() {
        if node == *destination {
            return first_hop.get(&node).cloned();
        }
        if dist.get(&node).map_or(false, |&best| d > best) {
            continue;
        }
        if node != *source {
            if let Node::Host(_) = node {
                continue;
            }
        }
        for (next, edge) in graph.neighbors(&node) {
            let nd = d.saturating_add(edge.weight);
            if dist.get(next).map_or(true, |&best| nd < best) {
                dist.insert(*next, nd);
                let hop = if node == *source {
                    NextHop {
                        node: *next,
                        port: edge.port,
                    }
                } else {
                    first_hop[&node]
                };
                first_hop.insert(*next, hop);
                heap.push(Reverse((nd, *next)));
            }
        }
    }
    None
}
