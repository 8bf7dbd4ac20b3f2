//! Controller-to-switch commands and the per-switch handle they are sent through.

use std::fmt;

use crate::error::Result;
use crate::packet::MacAddr;

/// Where a frame sent back to a switch should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Port(u16),
    /// Every port except the ingress port.
    Flood,
    /// No actions: the switch releases the buffer and discards the frame.
    Drop,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Output::Port(p) => write!(f, "port {}", p),
            Output::Flood => write!(f, "FLOOD"),
            Output::Drop => write!(f, "DROP"),
        }
    }
}

/// The frame a `SendFrame` command refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameData {
    /// A frame still held in the switch's packet buffer.
    Buffered(u32),
    /// A frame carried in full, either unbuffered at the switch or built by the controller.
    Raw(Vec<u8>),
}

/// Outbound command to a switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Add a permanent rule matching `(in_port, dl_dst)` with action "output to `out_port`".
    InstallRule {
        switch: u64,
        in_port: u16,
        dl_dst: MacAddr,
        out_port: u16,
    },
    /// Remove every entry from the switch's flow table.
    DeleteAllRules { switch: u64 },
    /// Send a frame out of the switch. `in_port` is `None` for controller-originated frames.
    SendFrame {
        switch: u64,
        in_port: Option<u16>,
        output: Output,
        data: FrameData,
    },
}

impl Command {
    pub fn switch(&self) -> u64 {
        match *self {
            Command::InstallRule { switch, .. } |
            Command::DeleteAllRules { switch } |
            Command::SendFrame { switch, .. } => switch,
        }
    }
}

/// Live control-channel handle to one switch.
///
/// Sends are fire-and-forget: an `Ok` means the command was written, not
/// that the switch applied it.
pub trait Datapath: Send + Sync {
    /// Datapath id of the switch behind this handle.
    fn id(&self) -> u64;
    /// Write `cmd` to the switch.
    fn send(&self, cmd: Command) -> Result<()>;
}
