#![crate_name = "green_ofp"]
#![crate_type = "lib"]

pub mod arp_proxy;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flow;
pub mod loop_guard;
pub mod mode;
pub mod ofp_controller;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow0x01;
pub mod packet;
pub mod path;
pub mod southbound;
pub mod topology;

pub use crate::config::Config;
pub use crate::dispatcher::{Controller, DropReason, FloodReason, Outcome, PacketIn, PortState};
pub use crate::error::{Error, Result};
pub use crate::mode::{Mode, ModeTimer};
