//! Topology modes and the timer that alternates between them.

use std::collections::BTreeSet;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use log::debug;

use crate::error::Result;

/// Which part of the discovered topology is in service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Every discovered switch and link.
    Full,
    /// Everything except the power-saving switches and their links.
    Reduced,
}

impl Mode {
    pub fn toggled(self) -> Mode {
        match self {
            Mode::Full => Mode::Reduced,
            Mode::Reduced => Mode::Full,
        }
    }

    /// Switches taken out of service in this mode.
    pub fn excluded(self, power_saving: &BTreeSet<u64>) -> BTreeSet<u64> {
        match self {
            Mode::Full => BTreeSet::new(),
            Mode::Reduced => power_saving.clone(),
        }
    }
}

impl Default for Mode {
    fn default() -> Mode {
        Mode::Full
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Mode::Full => write!(f, "FULL"),
            Mode::Reduced => write!(f, "REDUCED"),
        }
    }
}

/// Background thread invoking a callback once per interval until dropped.
pub struct ModeTimer {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ModeTimer {
    /// Start calling `on_tick` every `interval`, first after one full interval.
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Result<ModeTimer>
        where F: FnMut() + Send + 'static
    {
        let (shutdown, stop) = bounded::<()>(0);
        let ticker = tick(interval);
        let handle = thread::Builder::new().name("mode-timer".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => on_tick(),
                        recv(stop) -> _ => break,
                    }
                }
                debug!("mode timer stopped");
            })?;
        Ok(ModeTimer {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }
}

impl Drop for ModeTimer {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread.
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn toggling_alternates() {
        assert_eq!(Mode::default(), Mode::Full);
        assert_eq!(Mode::Full.toggled(), Mode::Reduced);
        assert_eq!(Mode::Reduced.toggled(), Mode::Full);
    }

    #[test]
    fn only_reduced_excludes() {
        let saving: BTreeSet<u64> = vec![8, 9].into_iter().collect();
        assert!(Mode::Full.excluded(&saving).is_empty());
        assert_eq!(Mode::Reduced.excluded(&saving), saving);
    }

    #[test]
    fn timer_ticks_until_dropped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let timer = ModeTimer::spawn(Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        drop(timer);
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
