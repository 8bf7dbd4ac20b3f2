//! End-to-end decision scenarios against a recording southbound.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use green_ofp::packet::{Arp, ArpOp, MacAddr, Packet};
use green_ofp::southbound::{Command, Datapath, FrameData, Output};
use green_ofp::topology::{Link, Node};
use green_ofp::{Config, Controller, FloodReason, Mode, Outcome, PacketIn, Result};

struct Recorder {
    id: u64,
    sent: Mutex<Vec<Command>>,
}

impl Recorder {
    fn new(id: u64) -> Arc<Recorder> {
        Arc::new(Recorder {
            id: id,
            sent: Mutex::new(vec![]),
        })
    }

    fn take(&self) -> Vec<Command> {
        std::mem::replace(&mut *self.sent.lock(), vec![])
    }
}

impl Datapath for Recorder {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.sent.lock().push(cmd);
        Ok(())
    }
}

fn host(n: u8) -> MacAddr {
    MacAddr([0x00, 0x04, 0x00, 0x00, 0x00, n])
}

fn ip(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, n)
}

fn ipv4_frame(src: MacAddr, dst: MacAddr) -> Vec<u8> {
    let mut bytes = vec![];
    bytes.extend_from_slice(&dst.octets());
    bytes.extend_from_slice(&src.octets());
    bytes.extend_from_slice(&[0x08, 0x00]);
    bytes.extend_from_slice(&[0x45, 0x00, 0x00, 0x1c, 0x00, 0x01, 0x00, 0x00, 64, 0x11, 0x00,
                              0x00, 10, 0, 0, 1, 10, 0, 0, 2]);
    bytes.extend_from_slice(&[0; 8]);
    bytes
}

fn arp_request(src: MacAddr, spa: Ipv4Addr, tpa: Ipv4Addr) -> Vec<u8> {
    let arp = Arp {
        oper: ArpOp::Request,
        sha: src,
        spa: spa,
        tha: MacAddr::default(),
        tpa: tpa,
    };
    Packet::arp_frame(src, MacAddr::BROADCAST, &arp)
}

fn packet(switch: u64, in_port: u16, frame: Vec<u8>) -> PacketIn {
    PacketIn {
        switch: switch,
        in_port: in_port,
        frame: frame,
        buffer_id: Some(256),
    }
}

/// Switches 1 and 2 joined by 1:2 <-> 2:1; switch 2 is power-saving.
fn two_switches() -> Controller {
    let config = Config {
        links: vec![Link::new(1, 2, 2, 1)],
        power_saving: vec![2].into_iter().collect(),
        ..Config::default()
    };
    let c = Controller::new(config);
    c.switch_appeared(1);
    c.switch_appeared(2);
    c
}

/// B announces itself at switch 2 port 1.
fn learn_b(c: &Controller) {
    let dp2: Arc<dyn Datapath> = Recorder::new(2);
    c.packet_in(&dp2, &packet(2, 1, ipv4_frame(host(2), host(1))));
}

#[test]
fn a_to_b_installs_rule_and_forwards() {
    let c = two_switches();
    learn_b(&c);

    let rec = Recorder::new(1);
    let dp1: Arc<dyn Datapath> = rec.clone();
    let outcome = c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2))));
    assert_eq!(outcome,
               Outcome::Forwarded {
                   next: Node::Switch(2),
                   port: 2,
               });
    assert_eq!(rec.take(),
               vec![Command::InstallRule {
                        switch: 1,
                        in_port: 1,
                        dl_dst: host(2),
                        out_port: 2,
                    },
                    Command::SendFrame {
                        switch: 1,
                        in_port: Some(1),
                        output: Output::Port(2),
                        data: FrameData::Buffered(256),
                    }]);
    assert!(c.with_graph(|g| g.has_node(&Node::Host(host(1)))));
}

#[test]
fn unknown_arp_target_floods_without_rule() {
    let c = two_switches();
    let rec = Recorder::new(1);
    let dp1: Arc<dyn Datapath> = rec.clone();
    let outcome = c.packet_in(&dp1, &packet(1, 1, arp_request(host(1), ip(1), ip(9))));
    assert_eq!(outcome, Outcome::Flooded(FloodReason::UnknownArpTarget));
    assert_eq!(rec.take(),
               vec![Command::SendFrame {
                        switch: 1,
                        in_port: Some(1),
                        output: Output::Flood,
                        data: FrameData::Buffered(256),
                    }]);
}

#[test]
fn reduced_mode_leaves_b_unreachable() {
    let c = two_switches();
    learn_b(&c);

    let rec = Recorder::new(1);
    let dp1: Arc<dyn Datapath> = rec.clone();
    c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2))));
    rec.take();

    assert_eq!(c.toggle_mode(), Mode::Reduced);
    // switch 1 had a rule installed, so its table is flushed
    assert_eq!(rec.take(), vec![Command::DeleteAllRules { switch: 1 }]);
    assert_eq!(c.tracked_switches(), 0);
    assert!(!c.with_graph(|g| g.has_node(&Node::Switch(2))));

    let outcome = c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2))));
    assert_eq!(outcome, Outcome::Flooded(FloodReason::UnreachableDestination));
    let sent = rec.take();
    assert_eq!(sent.len(), 1);
    match sent[0] {
        Command::SendFrame { output: Output::Flood, .. } => {}
        ref other => panic!("expected flood, got {:?}", other),
    }
}

#[test]
fn flush_hits_every_tracked_switch_once() {
    let c = two_switches();
    let recs: Vec<Arc<Recorder>> = vec![Recorder::new(1), Recorder::new(2)];
    for (i, rec) in recs.iter().enumerate() {
        let dp: Arc<dyn Datapath> = rec.clone();
        c.packet_in(&dp, &packet(rec.id, 1, ipv4_frame(host(i as u8 + 1), host(9))));
        rec.take();
    }
    assert_eq!(c.tracked_switches(), 2);
    c.toggle_mode();
    for rec in &recs {
        assert_eq!(rec.take(), vec![Command::DeleteAllRules { switch: rec.id }]);
    }
    assert_eq!(c.tracked_switches(), 0);
}

#[test]
fn looped_arp_broadcast_is_dropped_on_second_port() {
    let c = two_switches();
    let rec = Recorder::new(1);
    let dp1: Arc<dyn Datapath> = rec.clone();
    let req = arp_request(host(5), ip(5), ip(9));

    assert_eq!(c.packet_in(&dp1, &packet(1, 3, req.clone())),
               Outcome::Flooded(FloodReason::UnknownArpTarget));
    assert_eq!(c.packet_in(&dp1, &packet(1, 4, req.clone())),
               Outcome::Dropped(green_ofp::DropReason::LoopSuppressed));
    assert_eq!(c.packet_in(&dp1, &packet(1, 3, req)),
               Outcome::Flooded(FloodReason::UnknownArpTarget));
    let outputs: Vec<Output> = rec.take()
        .into_iter()
        .map(|cmd| match cmd {
            Command::SendFrame { output, .. } => output,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(outputs, vec![Output::Flood, Output::Drop, Output::Flood]);
}

#[test]
fn hosts_must_reannounce_after_a_transition() {
    let c = two_switches();
    learn_b(&c);
    c.toggle_mode();
    c.toggle_mode();
    assert_eq!(c.mode(), Mode::Full);
    assert!(!c.with_graph(|g| g.has_node(&Node::Host(host(2)))));

    let dp1: Arc<dyn Datapath> = Recorder::new(1);
    assert_eq!(c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2)))),
               Outcome::Flooded(FloodReason::UnreachableDestination));
    learn_b(&c);
    assert_eq!(c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2)))),
               Outcome::Forwarded {
                   next: Node::Switch(2),
                   port: 2,
               });
}

#[test]
fn dispatch_never_sees_a_half_switched_topology() {
    let c = Arc::new(two_switches());
    let rec1 = Recorder::new(1);
    let dp1: Arc<dyn Datapath> = rec1.clone();
    let dp2: Arc<dyn Datapath> = Recorder::new(2);

    learn_b(&c);
    assert_eq!(c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2)))),
               Outcome::Forwarded {
                   next: Node::Switch(2),
                   port: 2,
               });

    let toggler = {
        let c = Arc::clone(&c);
        let dp1 = Arc::clone(&dp1);
        thread::spawn(move || {
            for _ in 0..100 {
                // keep s1 tracked so every transition leaves a DeleteAllRules
                // marker in its command log
                c.packet_in(&dp1, &packet(1, 3, ipv4_frame(host(3), host(9))));
                c.toggle_mode();
            }
        })
    };
    for _ in 0..300 {
        c.packet_in(&dp2, &packet(2, 1, ipv4_frame(host(2), host(1))));
        match c.packet_in(&dp1, &packet(1, 1, ipv4_frame(host(1), host(2)))) {
            Outcome::Forwarded { next, port } => {
                assert_eq!((next, port), (Node::Switch(2), 2));
            }
            Outcome::Flooded(FloodReason::UnreachableDestination) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    toggler.join().unwrap();

    // s1's commands are recorded in lock order; replay them against the mode
    let mut mode = Mode::Full;
    let mut transitions = 0;
    for cmd in rec1.take() {
        match cmd {
            Command::DeleteAllRules { .. } => {
                mode = mode.toggled();
                transitions += 1;
            }
            Command::InstallRule { out_port, .. } => {
                assert_eq!(mode, Mode::Full, "rule installed while REDUCED");
                assert_eq!(out_port, 2);
            }
            Command::SendFrame { output: Output::Port(p), .. } => {
                assert_eq!(mode, Mode::Full, "frame forwarded while REDUCED");
                assert_eq!(p, 2);
            }
            Command::SendFrame { .. } => {}
        }
    }
    assert_eq!(transitions, 100);
    assert_eq!(mode, c.mode());
}
