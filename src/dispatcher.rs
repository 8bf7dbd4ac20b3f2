//! The controller core: shared state behind one lock, and the per-event
//! decision procedures run under it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::arp_proxy::{ArpOutcome, ArpProxy};
use crate::config::Config;
use crate::flow::FlowInstaller;
use crate::loop_guard::LoopGuard;
use crate::mode::Mode;
use crate::packet::{eth_typ, Packet};
use crate::path::{self, NextHop};
use crate::southbound::{Command, Datapath, FrameData, Output};
use crate::topology::{Discovery, Graph, Link, Node, TieBreak};

/// A frame a switch handed to the controller.
#[derive(Clone, Debug)]
pub struct PacketIn {
    pub switch: u64,
    pub in_port: u16,
    pub frame: Vec<u8>,
    /// Switch buffer holding the frame, if any.
    pub buffer_id: Option<u32>,
}

/// Operational state of a port as reported by the switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    Up,
    Down,
    /// Blocked by the spanning tree.
    Blocked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The ingress switch is out of service in the current mode.
    ExcludedSwitch,
    /// Not an Ethernet frame carrying IPv4 or ARP.
    UnsupportedFrame,
    /// A looped copy of a broadcast ARP request.
    LoopSuppressed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodReason {
    /// The destination is unknown or no path leads to it.
    UnreachableDestination,
    /// The ARP target has no table entry.
    UnknownArpTarget,
}

/// What the controller did with a packet-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A rule was installed and the frame sent out of `port`.
    Forwarded { next: Node, port: u16 },
    Flooded(FloodReason),
    /// The controller answered an ARP request itself.
    Replied,
    Dropped(DropReason),
}

/// Everything the decision procedures read or write. Only reachable through
/// `Controller`'s lock.
struct State {
    mode: Mode,
    graph: Graph,
    discovery: Discovery,
    arp: ArpProxy,
    flows: FlowInstaller,
    /// Mode transitions completed so far.
    epoch: u64,
    /// Switches that left while possibly holding our rules, with the epoch
    /// they left in.
    departed: BTreeMap<u64, u64>,
}

impl State {
    fn excluded(&self, config: &Config) -> BTreeSet<u64> {
        self.mode.excluded(&config.power_saving)
    }

    fn is_excluded(&self, config: &Config, switch: u64) -> bool {
        self.mode == Mode::Reduced && config.power_saving.contains(&switch)
    }

    fn link_active(&self, config: &Config, link: &Link) -> bool {
        !self.is_excluded(config, link.src) && !self.is_excluded(config, link.dst) &&
        self.discovery.link_up(link)
    }
}

/// Shortest-path controller.
///
/// Every entry point takes the same lock for its whole run, so a packet
/// decision never observes a graph that a mode transition is rebuilding,
/// and a transition never interleaves with a half-learned host.
pub struct Controller {
    config: Config,
    state: Mutex<State>,
}

impl Controller {
    pub fn new(config: Config) -> Controller {
        let mut arp = ArpProxy::new(LoopGuard::new(config.loop_window));
        for &(ip, mac) in &config.arp_seed {
            arp.learn(ip, mac);
        }
        let controller = Controller {
            state: Mutex::new(State {
                mode: Mode::Full,
                graph: Graph::new(),
                discovery: Discovery::new(),
                arp: arp,
                flows: FlowInstaller::new(),
                epoch: 0,
                departed: BTreeMap::new(),
            }),
            config: config,
        };
        for link in controller.config.links.clone() {
            controller.link_discovered(link);
        }
        controller
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    /// Run `f` against the live graph while holding the controller lock.
    pub fn with_graph<R, F: FnOnce(&Graph) -> R>(&self, f: F) -> R {
        f(&self.state.lock().graph)
    }

    /// Number of switches whose tables may hold rules installed by this controller.
    pub fn tracked_switches(&self) -> usize {
        self.state.lock().flows.len()
    }

    fn tie_break(&self) -> TieBreak {
        self.config.tie_break
    }

    /// A switch completed its handshake.
    pub fn switch_appeared(&self, switch: u64) {
        let mut st = self.state.lock();
        self.appear(&mut st, switch);
    }

    /// A switch completed its handshake on the channel behind `dp`. If it
    /// left holding rules and a mode transition happened while it was away,
    /// its table is flushed before it sees any new rule.
    pub fn switch_connected(&self, dp: &Arc<dyn Datapath>) {
        let switch = dp.id();
        let mut st = self.state.lock();
        self.appear(&mut st, switch);
        match st.departed.remove(&switch) {
            Some(left) if left != st.epoch => {
                info!("flow: s{} missed a mode transition, flushing its table", switch);
                self.send(dp, Command::DeleteAllRules { switch: switch });
            }
            _ => {}
        }
    }

    fn appear(&self, st: &mut State, switch: u64) {
        if st.discovery.switch_appeared(switch) {
            info!("topology: switch s{} appeared", switch);
        }
        if !st.is_excluded(&self.config, switch) {
            st.graph.add_node(Node::Switch(switch));
        }
    }

    /// A switch's control channel closed.
    pub fn switch_disconnected(&self, switch: u64) {
        let mut st = self.state.lock();
        if st.flows.forget(switch) {
            info!("topology: switch s{} disconnected", switch);
            let epoch = st.epoch;
            st.departed.insert(switch, epoch);
        }
    }

    /// Discovery observed a link.
    pub fn link_discovered(&self, link: Link) {
        let mut st = self.state.lock();
        if st.discovery.link_discovered(link) {
            info!("topology: link {} discovered", link);
        }
        for &sw in &[link.src, link.dst] {
            if !st.is_excluded(&self.config, sw) {
                st.graph.add_node(Node::Switch(sw));
            }
        }
        if st.link_active(&self.config, &link) {
            let tie = self.tie_break();
            st.graph.add_link(&link, tie);
        }
    }

    /// A port changed state. Links on a port that is not up leave the graph
    /// immediately and stay out of rebuilds until the port comes back.
    pub fn port_state_changed(&self, switch: u64, port: u16, state: PortState) {
        let mut st = self.state.lock();
        let up = state == PortState::Up;
        if !st.discovery.set_port_up(switch, port, up) {
            return;
        }
        info!("topology: s{} port {} is {:?}", switch, port, state);
        let tie = self.tie_break();
        for link in st.discovery.links_at(switch, port) {
            if up {
                if st.link_active(&self.config, &link) {
                    st.graph.add_link(&link, tie);
                }
            } else {
                st.graph.remove_link(&link);
            }
        }
    }

    /// Flip between FULL and REDUCED: rebuild the graph from discovery for the
    /// new mode and flush every tracked switch table. Returns the new mode.
    pub fn toggle_mode(&self) -> Mode {
        let mut st = self.state.lock();
        let mode = st.mode.toggled();
        self.enter_mode(&mut st, mode);
        mode
    }

    /// Switch to `mode`, rebuilding and flushing even if it is already current.
    pub fn set_mode(&self, mode: Mode) {
        let mut st = self.state.lock();
        self.enter_mode(&mut st, mode);
    }

    fn enter_mode(&self, st: &mut State, mode: Mode) {
        let started = Instant::now();
        st.mode = mode;
        st.epoch += 1;
        let excluded = st.excluded(&self.config);
        let tie = self.tie_break();
        let State { ref mut graph, ref discovery, ref mut flows, ref mut arp, .. } = *st;
        graph.rebuild_from_discovery(discovery, &excluded, tie);
        let flushed = flows.flush_all();
        arp.guard_mut().sweep(started);
        info!("mode: entered {} ({} switches, {} edges, {} tables flushed) in {:?}",
              mode,
              graph.node_count(),
              graph.edge_count(),
              flushed,
              started.elapsed());
    }

    /// Decide what to do with one frame and tell the switch behind `dp`.
    pub fn packet_in(&self, dp: &Arc<dyn Datapath>, pkt: &PacketIn) -> Outcome {
        let mut st = self.state.lock();
        let outcome = self.dispatch(&mut st, dp, pkt);
        debug!("dispatch: s{} port {} -> {:?}", pkt.switch, pkt.in_port, outcome);
        outcome
    }

    fn dispatch(&self, st: &mut State, dp: &Arc<dyn Datapath>, pkt: &PacketIn) -> Outcome {
        if st.is_excluded(&self.config, pkt.switch) {
            return Outcome::Dropped(DropReason::ExcludedSwitch);
        }
        let frame = match Packet::parse(&pkt.frame) {
            Ok(frame) if frame.dl_typ == eth_typ::IP || frame.dl_typ == eth_typ::ARP => frame,
            Ok(frame) => {
                debug!("dispatch: s{} ignoring ethertype {:#06x}", pkt.switch, frame.dl_typ);
                return Outcome::Dropped(DropReason::UnsupportedFrame);
            }
            Err(e) => {
                debug!("dispatch: s{} unparsable frame: {}", pkt.switch, e);
                return Outcome::Dropped(DropReason::UnsupportedFrame);
            }
        };
        st.flows.register(dp);

        if let Some(arp) = frame.arp() {
            st.arp.learn(arp.spa, arp.sha);
        }

        if st.graph.learn_host(pkt.switch, pkt.in_port, frame.dl_src) {
            info!("topology: host {} at s{} port {}",
                  frame.dl_src,
                  pkt.switch,
                  pkt.in_port);
        }

        let dst = Node::Host(frame.dl_dst);
        let hop = if st.graph.has_node(&dst) {
            path::resolve(&st.graph, &Node::Switch(pkt.switch), &dst)
        } else {
            match st.arp.handle(pkt.switch, pkt.in_port, &frame) {
                ArpOutcome::Replied { frame: reply } => {
                    self.send(dp,
                              Command::SendFrame {
                                  switch: pkt.switch,
                                  in_port: None,
                                  output: Output::Port(pkt.in_port),
                                  data: FrameData::Raw(reply),
                              });
                    return Outcome::Replied;
                }
                ArpOutcome::Suppressed => {
                    self.send_triggering(dp, pkt, Output::Drop);
                    return Outcome::Dropped(DropReason::LoopSuppressed);
                }
                ArpOutcome::Unknown => {
                    self.send_triggering(dp, pkt, Output::Flood);
                    return Outcome::Flooded(if frame.arp().is_some() {
                        FloodReason::UnknownArpTarget
                    } else {
                        FloodReason::UnreachableDestination
                    });
                }
            }
        };

        match hop {
            Some(NextHop { node, port }) => {
                if let Err(e) = st.flows.install(dp, pkt.in_port, frame.dl_dst, port) {
                    warn!("flow: install on s{} failed: {}", pkt.switch, e);
                }
                self.send_triggering(dp, pkt, Output::Port(port));
                Outcome::Forwarded {
                    next: node,
                    port: port,
                }
            }
            None => {
                self.send_triggering(dp, pkt, Output::Flood);
                Outcome::Flooded(FloodReason::UnreachableDestination)
            }
        }
    }

    /// Release the frame that caused `pkt` toward `output`.
    fn send_triggering(&self, dp: &Arc<dyn Datapath>, pkt: &PacketIn, output: Output) {
        let data = match pkt.buffer_id {
            Some(id) => FrameData::Buffered(id),
            None => FrameData::Raw(pkt.frame.clone()),
        };
        self.send(dp,
                  Command::SendFrame {
                      switch: pkt.switch,
                      in_port: Some(pkt.in_port),
                      output: output,
                      data: data,
                  });
    }

    fn send(&self, dp: &Arc<dyn Datapath>, cmd: Command) {
        let switch = cmd.switch();
        if let Err(e) = dp.send(cmd) {
            warn!("southbound: send to s{} failed: {}", switch, e);
        }
    }
}
