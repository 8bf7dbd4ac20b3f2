//! Flow rule installation and bulk table flushes.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info};

use crate::error::Result;
use crate::packet::MacAddr;
use crate::southbound::{Command, Datapath};

/// Every switch the controller has interacted with since the last flush,
/// keyed by datapath id.
#[derive(Default)]
pub struct FlowInstaller {
    installed: BTreeMap<u64, Arc<dyn Datapath>>,
}

impl FlowInstaller {
    pub fn new() -> FlowInstaller {
        FlowInstaller::default()
    }

    /// Track `dp`. Returns `true` if its switch was not tracked yet.
    pub fn register(&mut self, dp: &Arc<dyn Datapath>) -> bool {
        let id = dp.id();
        if self.installed.contains_key(&id) {
            return false;
        }
        self.installed.insert(id, Arc::clone(dp));
        true
    }

    /// Stop tracking `switch`, e.g. after its control channel closed.
    pub fn forget(&mut self, switch: u64) -> bool {
        self.installed.remove(&switch).is_some()
    }

    pub fn contains(&self, switch: u64) -> bool {
        self.installed.contains_key(&switch)
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    /// Install a permanent rule on `dp` forwarding frames from `in_port`
    /// addressed to `dl_dst` out of `out_port`.
    pub fn install(&mut self,
                   dp: &Arc<dyn Datapath>,
                   in_port: u16,
                   dl_dst: MacAddr,
                   out_port: u16)
                   -> Result<()> {
        self.register(dp);
        info!("flow: s{} in_port={} dl_dst={} -> output:{}",
              dp.id(),
              in_port,
              dl_dst,
              out_port);
        dp.send(Command::InstallRule {
            switch: dp.id(),
            in_port: in_port,
            dl_dst: dl_dst,
            out_port: out_port,
        })
    }

    /// Send `DeleteAllRules` to every tracked switch once, then forget them
    /// all. Failed deletes are logged and not retried. Returns the number of
    /// switches flushed.
    pub fn flush_all(&mut self) -> usize {
        let installed = std::mem::replace(&mut self.installed, BTreeMap::new());
        for (id, dp) in &installed {
            if let Err(e) = dp.send(Command::DeleteAllRules { switch: *id }) {
                error!("flow: failed to flush table of s{}: {}", id, e);
            }
        }
        info!("flow: flushed {} switch table(s)", installed.len());
        installed.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::packet::tests::mac;
    use parking_lot::Mutex;

    /// Records every command; fails every send when `broken`.
    pub struct Recorder {
        pub id: u64,
        pub broken: bool,
        pub sent: Mutex<Vec<Command>>,
    }

    impl Recorder {
        pub fn new(id: u64) -> Arc<Recorder> {
            Arc::new(Recorder {
                id: id,
                broken: false,
                sent: Mutex::new(vec![]),
            })
        }

        pub fn take(&self) -> Vec<Command> {
            std::mem::replace(&mut *self.sent.lock(), vec![])
        }
    }

    impl Datapath for Recorder {
        fn id(&self) -> u64 {
            self.id
        }

        fn send(&self, cmd: Command) -> Result<()> {
            self.sent.lock().push(cmd);
            if self.broken {
                Err(Error::ChannelClosed(self.id))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn install_registers_and_sends_rule() {
        let rec = Recorder::new(1);
        let dp: Arc<dyn Datapath> = rec.clone();
        let mut flows = FlowInstaller::new();
        flows.install(&dp, 1, mac(2), 2).unwrap();
        assert!(flows.contains(1));
        assert_eq!(rec.take(),
                   vec![Command::InstallRule {
                            switch: 1,
                            in_port: 1,
                            dl_dst: mac(2),
                            out_port: 2,
                        }]);
    }

    #[test]
    fn flush_reaches_every_switch_exactly_once() {
        let recs: Vec<Arc<Recorder>> = (1..4).map(Recorder::new).collect();
        let mut flows = FlowInstaller::new();
        for rec in &recs {
            let dp: Arc<dyn Datapath> = rec.clone();
            flows.register(&dp);
            flows.install(&dp, 1, mac(9), 2).unwrap();
            rec.take();
        }
        assert_eq!(flows.flush_all(), 3);
        assert!(flows.is_empty());
        for rec in &recs {
            assert_eq!(rec.take(), vec![Command::DeleteAllRules { switch: rec.id }]);
        }
        assert_eq!(flows.flush_all(), 0);
    }

    #[test]
    fn failed_flush_is_not_retried() {
        let rec = Arc::new(Recorder {
            id: 5,
            broken: true,
            sent: Mutex::new(vec![]),
        });
        let dp: Arc<dyn Datapath> = rec.clone();
        let mut flows = FlowInstaller::new();
        flows.register(&dp);
        assert_eq!(flows.flush_all(), 1);
        assert!(flows.is_empty());
        assert_eq!(rec.take().len(), 1);
    }

    #[test]
    fn forget_drops_a_switch() {
        let dp: Arc<dyn Datapath> = Recorder::new(7);
        let mut flows = FlowInstaller::new();
        assert!(flows.register(&dp));
        assert!(!flows.register(&dp));
        assert!(flows.forget(7));
        assert!(!flows.contains(7));
    }
}
