use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::packet::MacAddr;
use crate::topology::{Link, TieBreak};

/// Controller settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the OpenFlow listener binds to.
    pub listen: SocketAddr,
    /// Time between FULL/REDUCED mode flips.
    pub mode_interval: Duration,
    /// Switches powered down in REDUCED mode.
    pub power_saving: BTreeSet<u64>,
    /// Inactivity window of the broadcast loop guard.
    pub loop_window: Duration,
    pub tie_break: TieBreak,
    /// Links known up front, reported as discovered at start-up.
    pub links: Vec<Link>,
    /// Static ARP entries loaded at start-up.
    pub arp_seed: Vec<(Ipv4Addr, MacAddr)>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen: SocketAddr::from(([127, 0, 0, 1], 6633)),
            mode_interval: Duration::from_secs(60),
            power_saving: BTreeSet::new(),
            loop_window: Duration::from_secs(60),
            tie_break: TieBreak::default(),
            links: vec![],
            arp_seed: vec![],
        }
    }
}

impl Config {
    /// The ten-switch evaluation network: host `hN` (`10.0.0.N`,
    /// `00:04:00:00:00:0N`) hangs off port 1 of switch N for N in 1..=7,
    /// switches 8, 9 and 10 are pure transit and are powered down in REDUCED
    /// mode.
    pub fn eval_topology() -> Config {
        let links = [(1, 2, 2, 2),
                     (1, 3, 7, 2),
                     (1, 4, 8, 1),
                     (1, 5, 10, 1),
                     (2, 3, 10, 2),
                     (2, 4, 3, 2),
                     (3, 3, 9, 1),
                     (3, 4, 4, 2),
                     (4, 3, 5, 2),
                     (4, 4, 8, 2),
                     (5, 3, 6, 2),
                     (5, 4, 7, 3),
                     (6, 3, 7, 4),
                     (7, 5, 8, 3),
                     (8, 4, 9, 2),
                     (8, 5, 10, 3),
                     (9, 3, 10, 4)];
        Config {
            power_saving: vec![8, 9, 10].into_iter().collect(),
            links: links.iter()
                .map(|&(a, pa, b, pb)| Link::new(a, pa, b, pb))
                .collect(),
            arp_seed: (1..8u8)
                .map(|n| (Ipv4Addr::new(10, 0, 0, n), MacAddr([0x00, 0x04, 0x00, 0x00, 0x00, n])))
                .collect(),
            ..Config::default()
        }
    }
}
