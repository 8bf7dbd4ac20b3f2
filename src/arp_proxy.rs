//! Controller-side ARP responder.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use log::debug;

use crate::loop_guard::{FloodKey, LoopGuard, Verdict};
use crate::packet::{Arp, ArpOp, MacAddr, Packet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArpOutcome {
    /// The request was answered; `frame` is the serialized reply to send
    /// back out of the ingress port.
    Replied { frame: Vec<u8> },
    /// A looped copy of a broadcast already seen on another port.
    Suppressed,
    /// Nothing to answer with; the caller floods.
    Unknown,
}

/// IP-to-MAC cache learned from ARP traffic, plus the loop guard consulted
/// before answering broadcast requests. Entries are never evicted.
#[derive(Debug)]
pub struct ArpProxy {
    table: HashMap<Ipv4Addr, MacAddr>,
    guard: LoopGuard,
}

impl ArpProxy {
    pub fn new(guard: LoopGuard) -> ArpProxy {
        ArpProxy {
            table: HashMap::new(),
            guard: guard,
        }
    }

    /// Insert or overwrite the mapping for `ip`.
    pub fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if self.table.insert(ip, mac) != Some(mac) {
            debug!("arp: learned {} is-at {}", ip, mac);
        }
    }

    pub fn lookup(&self, ip: &Ipv4Addr) -> Option<MacAddr> {
        self.table.get(ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn guard_mut(&mut self) -> &mut LoopGuard {
        &mut self.guard
    }

    pub fn handle(&mut self, switch: u64, in_port: u16, pkt: &Packet) -> ArpOutcome {
        self.handle_at(switch, in_port, pkt, Instant::now())
    }

    /// Answer `pkt`, received on `(switch, in_port)`, if it is an ARP request
    /// for a known address.
    ///
    /// Broadcast ARP frames go through the loop guard first, keyed on
    /// `(switch, Ethernet source, target IP)`; a copy arriving on a port other
    /// than the recorded one is suppressed.
    pub fn handle_at(&mut self,
                     switch: u64,
                     in_port: u16,
                     pkt: &Packet,
                     now: Instant)
                     -> ArpOutcome {
        let arp = match pkt.arp() {
            Some(arp) => arp,
            None => return ArpOutcome::Unknown,
        };

        if pkt.dl_dst.is_broadcast() {
            let key = FloodKey {
                switch: switch,
                src: pkt.dl_src,
                target: arp.tpa,
            };
            if let Verdict::Looped { recorded } = self.guard.check_at(key, in_port, now) {
                debug!("arp: s{} dropping looped request from {} for {} on port {} (first seen on {})",
                       switch,
                       pkt.dl_src,
                       arp.tpa,
                       in_port,
                       recorded);
                return ArpOutcome::Suppressed;
            }
        }

        if arp.oper != ArpOp::Request {
            return ArpOutcome::Unknown;
        }
        match self.lookup(&arp.tpa) {
            Some(known) => {
                let reply = Arp {
                    oper: ArpOp::Reply,
                    sha: known,
                    spa: arp.tpa,
                    tha: pkt.dl_src,
                    tpa: arp.spa,
                };
                debug!("arp: s{} answering {} is-at {} to {}", switch, arp.tpa, known, pkt.dl_src);
                ArpOutcome::Replied { frame: Packet::arp_frame(known, pkt.dl_src, &reply) }
            }
            None => ArpOutcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::{arp_request, ipv4_frame, mac};
    use std::time::Duration;

    fn proxy() -> ArpProxy {
        ArpProxy::new(LoopGuard::new(Duration::from_secs(60)))
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn known_target_gets_a_reply() {
        let mut p = proxy();
        p.learn(ip(2), mac(2));
        let req = Packet::parse(&arp_request(mac(1), ip(1), ip(2))).unwrap();
        let frame = match p.handle(1, 1, &req) {
            ArpOutcome::Replied { frame } => frame,
            other => panic!("expected reply, got {:?}", other),
        };
        let reply = Packet::parse(&frame).unwrap();
        assert_eq!(reply.dl_src, mac(2));
        assert_eq!(reply.dl_dst, mac(1));
        assert_eq!(reply.arp().unwrap(),
                   &Arp {
                       oper: ArpOp::Reply,
                       sha: mac(2),
                       spa: ip(2),
                       tha: mac(1),
                       tpa: ip(1),
                   });
    }

    #[test]
    fn unknown_target_is_left_to_flooding() {
        let mut p = proxy();
        let req = Packet::parse(&arp_request(mac(1), ip(1), ip(9))).unwrap();
        assert_eq!(p.handle(1, 1, &req), ArpOutcome::Unknown);
    }

    #[test]
    fn looped_broadcast_is_suppressed() {
        let mut p = proxy();
        let req = Packet::parse(&arp_request(mac(1), ip(1), ip(9))).unwrap();
        assert_eq!(p.handle(3, 2, &req), ArpOutcome::Unknown);
        assert_eq!(p.handle(3, 4, &req), ArpOutcome::Suppressed);
        assert_eq!(p.handle(3, 2, &req), ArpOutcome::Unknown);
        // a different switch has its own memory
        assert_eq!(p.handle(4, 4, &req), ArpOutcome::Unknown);
    }

    #[test]
    fn learning_overwrites() {
        let mut p = proxy();
        p.learn(ip(2), mac(2));
        p.learn(ip(2), mac(7));
        assert_eq!(p.lookup(&ip(2)), Some(mac(7)));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn non_arp_frames_are_unknown() {
        let mut p = proxy();
        let pkt = Packet::parse(&ipv4_frame(mac(1), mac(2))).unwrap();
        assert_eq!(p.handle(1, 1, &pkt), ArpOutcome::Unknown);
        assert!(p.guard_mut().is_empty());
    }
}
