use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use green_ofp::ofp_controller::OfpController;
use green_ofp::packet::MacAddr;
use green_ofp::topology::{Link, TieBreak};
use green_ofp::{Config, Controller, Error, ModeTimer};

/// Shortest-path OpenFlow 1.0 controller alternating between a full and a
/// power-saving topology.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to accept switch connections on
    #[arg(long, default_value = "127.0.0.1:6633")]
    listen: SocketAddr,

    /// Seconds between FULL/REDUCED mode flips
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Switches powered down in REDUCED mode (comma separated)
    #[arg(long, value_delimiter = ',')]
    power_saving: Vec<u64>,

    /// Inter-switch link, as <switch>:<port>-<switch>:<port> (repeatable)
    #[arg(long = "link")]
    links: Vec<Link>,

    /// Static ARP entry, as <ip>=<mac> (repeatable)
    #[arg(long = "arp", value_parser = parse_arp_entry)]
    arp: Vec<(Ipv4Addr, MacAddr)>,

    /// Seconds a broadcast ARP sighting is remembered for loop suppression
    #[arg(long, default_value_t = 60)]
    loop_window: u64,

    /// Equal-hop tie-break: prefer-lower, prefer-higher or hop-count
    #[arg(long, default_value = "prefer-lower")]
    tie_break: TieBreak,

    /// Start from the built-in ten-switch evaluation topology
    #[arg(long)]
    eval_topology: bool,
}

fn parse_arp_entry(s: &str) -> Result<(Ipv4Addr, MacAddr), Error> {
    let malformed = || {
        Error::Malformed {
            what: "ARP entry",
            detail: s.to_string(),
        }
    };
    let mut parts = s.splitn(2, '=');
    let ip = parts.next().and_then(|ip| ip.parse().ok()).ok_or_else(malformed)?;
    let mac = parts.next().ok_or_else(malformed)?.parse()?;
    Ok((ip, mac))
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = if self.eval_topology {
            Config::eval_topology()
        } else {
            Config::default()
        };
        config.listen = self.listen;
        config.mode_interval = Duration::from_secs(self.interval);
        config.loop_window = Duration::from_secs(self.loop_window);
        config.tie_break = self.tie_break;
        config.power_saving.extend(self.power_saving);
        config.links.extend(self.links);
        config.arp_seed.extend(self.arp);
        config
    }
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    info!("listening on {}, mode interval {:?}, power-saving switches {:?}",
          config.listen,
          config.mode_interval,
          config.power_saving);

    let listener = TcpListener::bind(config.listen)?;
    let interval = config.mode_interval;
    let controller = Arc::new(Controller::new(config));

    let ticking = Arc::clone(&controller);
    let _timer = ModeTimer::spawn(interval, move || {
        ticking.toggle_mode();
    })?;

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || controller.handle_client_connected(stream));
            }
            Err(e) => warn!("accept failed: {}", e),
        }
    }
    Ok(())
}
