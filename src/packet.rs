use std::fmt;
use std::io::{BufRead, Cursor, Read};
use std::net::Ipv4Addr;
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ensure_len, Error, Result};

/// Ethernet (link-layer) address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    fn read(bytes: &mut Cursor<&[u8]>) -> Result<MacAddr> {
        let mut arr = [0; 6];
        bytes.read_exact(&mut arr)?;
        Ok(MacAddr(arr))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(f,
               "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               o[0],
               o[1],
               o[2],
               o[3],
               o[4],
               o[5])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> MacAddr {
        MacAddr(octets)
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<MacAddr> {
        let malformed = || {
            Error::Malformed {
                what: "MAC address",
                detail: s.to_string(),
            }
        };
        let mut arr = [0; 6];
        let mut parts = s.split(':');
        for octet in arr.iter_mut() {
            let part = parts.next().ok_or_else(malformed)?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
        }
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(MacAddr(arr))
    }
}

/// Ethernet type codes understood by the controller.
pub mod eth_typ {
    pub const IP: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86dd;
    pub const LLDP: u16 = 0x88cc;
}

const ETH_HEADER_LEN: usize = 14;
const ETH_MIN_FRAME_LEN: usize = 60;

/// IPv4 header of a packet. Transport payloads are not interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ip {
    pub tos: u8,
    pub ttl: u8,
    pub proto: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

const IP_MIN_HEADER_LEN: usize = 20;

impl Ip {
    fn parse(bytes: &mut Cursor<&[u8]>) -> Option<Ip> {
        let remaining = bytes.get_ref().len() - bytes.position() as usize;
        if remaining < IP_MIN_HEADER_LEN {
            return None;
        }
        let vhl = bytes.read_u8().ok()?;
        if (vhl >> 4) != 4 || (vhl & 0x0f) < 5 {
            return None;
        }
        let tos = bytes.read_u8().ok()?;
        // total length, identification, flags and fragment offset
        bytes.consume(6);
        let ttl = bytes.read_u8().ok()?;
        let proto = bytes.read_u8().ok()?;
        bytes.consume(2);
        let src = Ipv4Addr::from(bytes.read_u32::<BigEndian>().ok()?);
        let dst = Ipv4Addr::from(bytes.read_u32::<BigEndian>().ok()?);
        Some(Ip {
            tos: tos,
            ttl: ttl,
            proto: proto,
            src: src,
            dst: dst,
        })
    }
}

/// ARP operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
}

impl ArpOp {
    fn of_int(oper: u16) -> Option<ArpOp> {
        match oper {
            0x0001 => Some(ArpOp::Request),
            0x0002 => Some(ArpOp::Reply),
            _ => None,
        }
    }

    fn to_int(self) -> u16 {
        match self {
            ArpOp::Request => 0x0001,
            ArpOp::Reply => 0x0002,
        }
    }
}

/// Address resolution protocol (ARP) packet payload for Ethernet/IPv4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arp {
    pub oper: ArpOp,
    /// Sender hardware address.
    pub sha: MacAddr,
    /// Sender protocol address.
    pub spa: Ipv4Addr,
    /// Target hardware address.
    pub tha: MacAddr,
    /// Target protocol address.
    pub tpa: Ipv4Addr,
}

const ARP_LEN: usize = 28;

impl Arp {
    fn parse(bytes: &mut Cursor<&[u8]>) -> Option<Arp> {
        let remaining = bytes.get_ref().len() - bytes.position() as usize;
        if remaining < ARP_LEN {
            return None;
        }
        let htype = bytes.read_u16::<BigEndian>().ok()?;
        let ptype = bytes.read_u16::<BigEndian>().ok()?;
        let hlen = bytes.read_u8().ok()?;
        let plen = bytes.read_u8().ok()?;
        if htype != 1 || ptype != eth_typ::IP || hlen != 6 || plen != 4 {
            return None;
        }
        let oper = ArpOp::of_int(bytes.read_u16::<BigEndian>().ok()?)?;
        let sha = MacAddr::read(bytes).ok()?;
        let spa = Ipv4Addr::from(bytes.read_u32::<BigEndian>().ok()?);
        let tha = MacAddr::read(bytes).ok()?;
        let tpa = Ipv4Addr::from(bytes.read_u32::<BigEndian>().ok()?);
        Some(Arp {
            oper: oper,
            sha: sha,
            spa: spa,
            tha: tha,
            tpa: tpa,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(1).unwrap();
        bytes.write_u16::<BigEndian>(eth_typ::IP).unwrap();
        bytes.write_u8(6).unwrap();
        bytes.write_u8(4).unwrap();
        bytes.write_u16::<BigEndian>(self.oper.to_int()).unwrap();
        bytes.extend_from_slice(&self.sha.octets());
        bytes.extend_from_slice(&self.spa.octets());
        bytes.extend_from_slice(&self.tha.octets());
        bytes.extend_from_slice(&self.tpa.octets());
    }
}

/// Represents a packet at the network protocol level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Nw {
    Ip(Ip),
    Arp(Arp),
    Unparsable(u16, Vec<u8>),
}

/// Represents a packet at the ethernet protocol level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    /// Ethernet type of the payload, after any 802.1Q tag.
    pub dl_typ: u16,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: u8,
    pub nw: Nw,
}

impl Packet {
    pub fn parse(buf: &[u8]) -> Result<Packet> {
        ensure_len("Ethernet frame", buf, ETH_HEADER_LEN)?;
        let mut bytes = Cursor::new(buf);
        let dst = MacAddr::read(&mut bytes)?;
        let src = MacAddr::read(&mut bytes)?;
        let typ = bytes.read_u16::<BigEndian>()?;
        let (tag, pcp, typ) = match typ {
            eth_typ::VLAN => {
                let tag_and_pcp = bytes.read_u16::<BigEndian>()?;
                let tag = tag_and_pcp & 0xfff;
                let pcp = tag_and_pcp >> 13;
                let typ = bytes.read_u16::<BigEndian>()?;
                (Some(tag), pcp as u8, typ)
            }
            _ => (None, 0x0, typ),
        };
        let start = bytes.position() as usize;
        let nw = match typ {
            eth_typ::IP => Ip::parse(&mut bytes).map(Nw::Ip),
            eth_typ::ARP => Arp::parse(&mut bytes).map(Nw::Arp),
            _ => None,
        };
        Ok(Packet {
            dl_src: src,
            dl_dst: dst,
            dl_typ: typ,
            dl_vlan: tag,
            dl_vlan_pcp: pcp,
            nw: nw.unwrap_or_else(|| Nw::Unparsable(typ, buf[start..].to_vec())),
        })
    }

    /// The ARP payload, if this is a well-formed ARP frame.
    pub fn arp(&self) -> Option<&Arp> {
        match self.nw {
            Nw::Arp(ref arp) => Some(arp),
            _ => None,
        }
    }

    /// Serialize an untagged Ethernet frame carrying `arp`, padded to the
    /// minimum Ethernet frame length.
    pub fn arp_frame(dl_src: MacAddr, dl_dst: MacAddr, arp: &Arp) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ETH_MIN_FRAME_LEN);
        bytes.extend_from_slice(&dl_dst.octets());
        bytes.extend_from_slice(&dl_src.octets());
        bytes.write_u16::<BigEndian>(eth_typ::ARP).unwrap();
        arp.marshal(&mut bytes);
        bytes.resize(ETH_MIN_FRAME_LEN, 0);
        bytes
    }
}
