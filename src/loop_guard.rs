//! Broadcast loop suppression.
//!
//! A broadcast ARP request flooded through a meshed topology reaches the same
//! switch again over a different port. Remembering the first ingress port per
//! `(switch, requester, target)` lets the controller discard the copies.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::packet::MacAddr;

/// Identity of one broadcast resolution attempt as seen by one switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FloodKey {
    pub switch: u64,
    pub src: MacAddr,
    pub target: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting (or the previous one expired); the port is now recorded.
    First,
    /// Seen before on the same port.
    SamePort,
    /// Seen before on a different port: a looped copy.
    Looped { recorded: u16 },
}

#[derive(Clone, Copy, Debug)]
struct Sighting {
    port: u16,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct LoopGuard {
    window: Duration,
    seen: HashMap<FloodKey, Sighting>,
}

impl LoopGuard {
    /// Entries untouched for longer than `window` are forgotten.
    pub fn new(window: Duration) -> LoopGuard {
        LoopGuard {
            window: window,
            seen: HashMap::new(),
        }
    }

    pub fn check(&mut self, key: FloodKey, port: u16) -> Verdict {
        self.check_at(key, port, Instant::now())
    }

    /// Classify a sighting of `key` on `port` at time `now`.
    ///
    /// Expiry is lazy: a stale entry is only replaced when its key is looked
    /// up again. A looped copy does not overwrite the recorded port, so the
    /// original port keeps being accepted.
    pub fn check_at(&mut self, key: FloodKey, port: u16, now: Instant) -> Verdict {
        if let Some(s) = self.seen.get_mut(&key) {
            if now.saturating_duration_since(s.last_seen) <= self.window {
                if s.port != port {
                    return Verdict::Looped { recorded: s.port };
                }
                s.last_seen = now;
                return Verdict::SamePort;
            }
        }
        self.seen.insert(key,
                         Sighting {
                             port: port,
                             last_seen: now,
                         });
        Verdict::First
    }

    /// Drop every expired entry.
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.seen.retain(|_, s| now.saturating_duration_since(s.last_seen) <= window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::mac;

    fn key(switch: u64) -> FloodKey {
        FloodKey {
            switch: switch,
            src: mac(1),
            target: Ipv4Addr::new(10, 0, 0, 2),
        }
    }

    #[test]
    fn second_port_is_suppressed_first_is_not() {
        let mut guard = LoopGuard::new(Duration::from_secs(60));
        let t = Instant::now();
        assert_eq!(guard.check_at(key(1), 1, t), Verdict::First);
        assert_eq!(guard.check_at(key(1), 3, t), Verdict::Looped { recorded: 1 });
        assert_eq!(guard.check_at(key(1), 1, t), Verdict::SamePort);
        assert_eq!(guard.check_at(key(1), 3, t), Verdict::Looped { recorded: 1 });
    }

    #[test]
    fn keys_are_per_switch() {
        let mut guard = LoopGuard::new(Duration::from_secs(60));
        let t = Instant::now();
        assert_eq!(guard.check_at(key(1), 1, t), Verdict::First);
        assert_eq!(guard.check_at(key(2), 3, t), Verdict::First);
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn stale_entries_are_replaced_on_lookup() {
        let mut guard = LoopGuard::new(Duration::from_secs(5));
        let t = Instant::now();
        assert_eq!(guard.check_at(key(1), 1, t), Verdict::First);
        let later = t + Duration::from_secs(6);
        assert_eq!(guard.check_at(key(1), 3, later), Verdict::First);
        assert_eq!(guard.check_at(key(1), 1, later), Verdict::Looped { recorded: 3 });
    }

    #[test]
    fn same_port_refreshes_the_entry() {
        let mut guard = LoopGuard::new(Duration::from_secs(5));
        let t = Instant::now();
        guard.check_at(key(1), 1, t);
        guard.check_at(key(1), 1, t + Duration::from_secs(4));
        let later = t + Duration::from_secs(8);
        assert_eq!(guard.check_at(key(1), 2, later), Verdict::Looped { recorded: 1 });
    }

    #[test]
    fn sweep_forgets_expired_entries() {
        let mut guard = LoopGuard::new(Duration::from_secs(5));
        let t = Instant::now();
        guard.check_at(key(1), 1, t);
        guard.check_at(key(2), 1, t + Duration::from_secs(4));
        guard.sweep(t + Duration::from_secs(6));
        assert_eq!(guard.len(), 1);
        guard.sweep(t + Duration::from_secs(20));
        assert!(guard.is_empty());
    }
}
