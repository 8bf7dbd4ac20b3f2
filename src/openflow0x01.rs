use std::io::{BufRead, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ensure_len, Error, Result};
use crate::packet::MacAddr;

/// OpenFlow 1.0 protocol version byte.
pub const OFP_VERSION: u8 = 0x01;

/// Default priority for installed flows (`OFP_DEFAULT_PRIORITY`).
pub const DEFAULT_PRIORITY: u16 = 0x8000;

/// OpenFlow 1.0 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    const ALL: [MsgCode; 22] = [MsgCode::Hello,
                                MsgCode::Error,
                                MsgCode::EchoReq,
                                MsgCode::EchoResp,
                                MsgCode::Vendor,
                                MsgCode::FeaturesReq,
                                MsgCode::FeaturesResp,
                                MsgCode::GetConfigReq,
                                MsgCode::GetConfigResp,
                                MsgCode::SetConfig,
                                MsgCode::PacketIn,
                                MsgCode::FlowRemoved,
                                MsgCode::PortStatus,
                                MsgCode::PacketOut,
                                MsgCode::FlowMod,
                                MsgCode::PortMod,
                                MsgCode::StatsReq,
                                MsgCode::StatsResp,
                                MsgCode::BarrierReq,
                                MsgCode::BarrierResp,
                                MsgCode::QueueGetConfigReq,
                                MsgCode::QueueGetConfigResp];

    /// Map a raw header type byte to its message code.
    pub fn of_int(typ: u8) -> Option<MsgCode> {
        Self::ALL.get(typ as usize).cloned()
    }
}

/// Common API for message types implementing OpenFlow Message Codes (see `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message body.
    fn size_of(msg: &Self) -> usize;
    /// Parse a message body.
    fn parse(buf: &[u8]) -> Result<Self>;
    /// Marshal a message body into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

/// Test whether bit `bit` of `x` is set.
fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

fn rest(bytes: &mut Cursor<&[u8]>) -> Vec<u8> {
    let mut v = vec![];
    // Reading to the end of an in-memory cursor cannot fail.
    let _ = bytes.read_to_end(&mut v);
    v
}

#[repr(u32)]
enum Wildcard {
    InPort = 1 << 0,
    DlVlan = 1 << 1,
    DlSrc = 1 << 2,
    DlDst = 1 << 3,
    DlType = 1 << 4,
    NwProto = 1 << 5,
    TpSrc = 1 << 6,
    TpDst = 1 << 7,
    NwSrcAll = 32 << 8,
    NwDstAll = 32 << 14,
    DlVlanPcp = 1 << 20,
    NwTos = 1 << 21,
}

const OFP_MATCH_LEN: usize = 40;

/// Fields to match against flows. `None` fields are wildcarded; every field
/// the controller never matches on is always wildcarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    pub in_port: Option<u16>,
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_typ: Option<u16>,
}

impl Pattern {
    /// A pattern matching every packet.
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    fn wildcards_of(p: &Pattern) -> u32 {
        let always = Wildcard::DlVlan as u32 | Wildcard::NwProto as u32 | Wildcard::TpSrc as u32 |
                     Wildcard::TpDst as u32 | Wildcard::NwSrcAll as u32 |
                     Wildcard::NwDstAll as u32 | Wildcard::DlVlanPcp as u32 |
                     Wildcard::NwTos as u32;
        let mut w = always;
        if p.in_port.is_none() {
            w |= Wildcard::InPort as u32;
        }
        if p.dl_src.is_none() {
            w |= Wildcard::DlSrc as u32;
        }
        if p.dl_dst.is_none() {
            w |= Wildcard::DlDst as u32;
        }
        if p.dl_typ.is_none() {
            w |= Wildcard::DlType as u32;
        }
        w
    }

    fn marshal(p: Pattern, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(Pattern::wildcards_of(&p)).unwrap();
        bytes.write_u16::<BigEndian>(p.in_port.unwrap_or(0)).unwrap();
        bytes.extend_from_slice(&p.dl_src.unwrap_or_default().octets());
        bytes.extend_from_slice(&p.dl_dst.unwrap_or_default().octets());
        // dl_vlan, dl_vlan_pcp, pad
        bytes.extend_from_slice(&[0; 4]);
        bytes.write_u16::<BigEndian>(p.dl_typ.unwrap_or(0)).unwrap();
        // nw_tos, nw_proto, pad, nw_src, nw_dst, tp_src, tp_dst
        bytes.extend_from_slice(&[0; 16]);
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Pattern> {
        let w = bytes.read_u32::<BigEndian>()?;
        let wild = |flag: Wildcard| test_bit((flag as u32).trailing_zeros() as u64, w as u64);
        let in_port = bytes.read_u16::<BigEndian>()?;
        let mut dl_src = [0; 6];
        bytes.read_exact(&mut dl_src)?;
        let mut dl_dst = [0; 6];
        bytes.read_exact(&mut dl_dst)?;
        bytes.consume(4);
        let dl_typ = bytes.read_u16::<BigEndian>()?;
        bytes.consume(16);
        Ok(Pattern {
            in_port: if wild(Wildcard::InPort) { None } else { Some(in_port) },
            dl_src: if wild(Wildcard::DlSrc) { None } else { Some(MacAddr(dl_src)) },
            dl_dst: if wild(Wildcard::DlDst) { None } else { Some(MacAddr(dl_dst)) },
            dl_typ: if wild(Wildcard::DlType) { None } else { Some(dl_typ) },
        })
    }
}

/// Port behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u64),
    Local,
}

#[repr(u16)]
enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

impl PseudoPort {
    fn of_int(p: u16) -> Result<Option<PseudoPort>> {
        if (OfpPort::OFPPNone as u16) == p {
            Ok(None)
        } else {
            PseudoPort::make(p, 0).map(Some)
        }
    }

    fn make(p: u16, len: u64) -> Result<PseudoPort> {
        let port = match p {
            p if p == (OfpPort::OFPPInPort as u16) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u16) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u16) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u16) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u16) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u16) => PseudoPort::Controller(len),
            p if p == (OfpPort::OFPPLocal as u16) => PseudoPort::Local,
            p if p <= (OfpPort::OFPPMax as u16) => PseudoPort::PhysicalPort(p),
            p => {
                return Err(Error::Malformed {
                    what: "port number",
                    detail: format!("{:#06x}", p),
                })
            }
        };
        Ok(port)
    }

    fn to_int(pp: PseudoPort) -> u16 {
        match pp {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        }
    }

    fn marshal(pp: PseudoPort, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(PseudoPort::to_int(pp)).unwrap()
    }
}

/// Actions associated with flows and packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
}

#[repr(u16)]
enum OfpActionType {
    OFPATOutput,
}

const OFP_ACTION_OUTPUT_LEN: usize = 8;

impl Action {
    fn type_code(a: &Action) -> OfpActionType {
        match *a {
            Action::Output(_) => OfpActionType::OFPATOutput,
        }
    }

    fn size_of(a: &Action) -> usize {
        match *a {
            Action::Output(_) => OFP_ACTION_OUTPUT_LEN,
        }
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Action> {
        let action_code = bytes.read_u16::<BigEndian>()?;
        let len = bytes.read_u16::<BigEndian>()? as usize;
        if action_code != OfpActionType::OFPATOutput as u16 || len != OFP_ACTION_OUTPUT_LEN {
            return Err(Error::Malformed {
                what: "action",
                detail: format!("type {} length {}", action_code, len),
            });
        }
        let port_code = bytes.read_u16::<BigEndian>()?;
        let max_len = bytes.read_u16::<BigEndian>()?;
        Ok(Action::Output(PseudoPort::make(port_code, max_len as u64)?))
    }

    fn parse_sequence(bytes: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<Action>> {
        let end = bytes.position() as usize + len;
        let mut v = vec![];
        while (bytes.position() as usize) < end {
            v.push(Action::parse(bytes)?);
        }
        Ok(v)
    }

    fn move_controller_last(acts: Vec<Action>) -> Vec<Action> {
        let (mut to_ctrl, mut not_to_ctrl): (Vec<Action>, Vec<Action>) = acts.into_iter()
            .partition(|act| match *act {
                Action::Output(PseudoPort::Controller(_)) => true,
                _ => false,
            });
        not_to_ctrl.append(&mut to_ctrl);
        not_to_ctrl
    }

    fn marshal(act: Action, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(Action::type_code(&act) as u16).unwrap();
        bytes.write_u16::<BigEndian>(Action::size_of(&act) as u16).unwrap();
        match act {
            Action::Output(pp) => {
                PseudoPort::marshal(pp, bytes);
                bytes.write_u16::<BigEndian>(match pp {
                        PseudoPort::Controller(w) => w as u16,
                        _ => 0,
                    })
                    .unwrap()
            }
        }
    }
}

/// How long before a flow entry expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Switch features.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub ports: Vec<PortDesc>,
}

const OFP_SWITCH_FEATURES_LEN: usize = 24;

impl MessageType for SwitchFeatures {
    fn size_of(sf: &SwitchFeatures) -> usize {
        OFP_SWITCH_FEATURES_LEN + sf.ports.len() * OFP_PHY_PORT_LEN
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures> {
        ensure_len("features reply", buf, OFP_SWITCH_FEATURES_LEN)?;
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        // pad, capabilities, supported actions
        bytes.consume(3 + 4 + 4);
        let mut ports = vec![];
        while remaining(&bytes) >= OFP_PHY_PORT_LEN {
            ports.push(PortDesc::parse(&mut bytes)?);
        }
        Ok(SwitchFeatures {
            datapath_id: datapath_id,
            num_buffers: num_buffers,
            num_tables: num_tables,
            ports: ports,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(sf.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(sf.num_buffers).unwrap();
        bytes.write_u8(sf.num_tables).unwrap();
        bytes.extend_from_slice(&[0; 11]);
        for port in sf.ports {
            PortDesc::marshal(port, bytes);
        }
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn of_int(cmd: u16) -> Result<FlowModCmd> {
        match cmd {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            c => {
                Err(Error::Malformed {
                    what: "flow mod command",
                    detail: c.to_string(),
                })
            }
        }
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

const OFP_FLOW_MOD_LEN: usize = 24;

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
    }

    fn check_overlap_of_flags(flags: u16) -> bool {
        2 & flags != 0
    }

    fn notify_when_removed_of_flags(flags: u16) -> bool {
        1 & flags != 0
    }
}

impl MessageType for FlowMod {
    fn size_of(msg: &FlowMod) -> usize {
        OFP_MATCH_LEN + OFP_FLOW_MOD_LEN + Action::size_of_sequence(&msg.actions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod> {
        ensure_len("flow mod", buf, OFP_MATCH_LEN + OFP_FLOW_MOD_LEN)?;
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let command = FlowModCmd::of_int(bytes.read_u16::<BigEndian>()?)?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let prio = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_i32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let len = remaining(&bytes);
        let actions = Action::parse_sequence(&mut bytes, len)?;
        Ok(FlowMod {
            command: command,
            pattern: pattern,
            priority: prio,
            actions: actions,
            cookie: cookie,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: FlowMod::notify_when_removed_of_flags(flags),
            apply_to_packet: match buffer_id {
                -1 => None,
                n => Some(n as u32),
            },
            out_port: out_port,
            check_overlap: FlowMod::check_overlap_of_flags(flags),
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        Pattern::marshal(fm.pattern, bytes);
        bytes.write_u64::<BigEndian>(fm.cookie).unwrap();
        bytes.write_u16::<BigEndian>(fm.command as u16).unwrap();
        bytes.write_u16::<BigEndian>(Timeout::to_int(fm.idle_timeout)).unwrap();
        bytes.write_u16::<BigEndian>(Timeout::to_int(fm.hard_timeout)).unwrap();
        bytes.write_u16::<BigEndian>(fm.priority).unwrap();
        bytes.write_i32::<BigEndian>(match fm.apply_to_packet {
                None => -1,
                Some(buf_id) => buf_id as i32,
            })
            .unwrap();
        match fm.out_port {
            None => bytes.write_u16::<BigEndian>(OfpPort::OFPPNone as u16).unwrap(),
            Some(x) => PseudoPort::marshal(x, bytes),
        }
        bytes.write_u16::<BigEndian>(FlowMod::flags_to_int(fm.check_overlap,
                                                          fm.notify_when_removed))
            .unwrap();
        for act in Action::move_controller_last(fm.actions) {
            // OFPP_TABLE is only meaningful in packet-out messages.
            if act != Action::Output(PseudoPort::Table) {
                Action::marshal(act, bytes)
            }
        }
    }
}

/// The data associated with a packet received by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) |
            Payload::NotBuffered(ref buf) => buf.len(),
        }
    }

    fn of_buffer_id(buf_id: i32, data: Vec<u8>) -> Payload {
        match buf_id {
            -1 => Payload::NotBuffered(data),
            n => Payload::Buffered(n as u32, data),
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

const OFP_PACKET_IN_LEN: usize = 10;

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        OFP_PACKET_IN_LEN + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn> {
        ensure_len("packet in", buf, OFP_PACKET_IN_LEN)?;
        let mut bytes = Cursor::new(buf);
        let buf_id = bytes.read_i32::<BigEndian>()?;
        let total_len = bytes.read_u16::<BigEndian>()?;
        let port = bytes.read_u16::<BigEndian>()?;
        let reason = match bytes.read_u8()? {
            0 => PacketInReason::NoMatch,
            _ => PacketInReason::ExplicitSend,
        };
        bytes.consume(1);
        Ok(PacketIn {
            input_payload: Payload::of_buffer_id(buf_id, rest(&mut bytes)),
            total_len: total_len,
            port: port,
            reason: reason,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        let (buf_id, data) = match pi.input_payload {
            Payload::Buffered(n, data) => (n as i32, data),
            Payload::NotBuffered(data) => (-1, data),
        };
        bytes.write_i32::<BigEndian>(buf_id).unwrap();
        bytes.write_u16::<BigEndian>(pi.total_len).unwrap();
        bytes.write_u16::<BigEndian>(pi.port).unwrap();
        bytes.write_u8(pi.reason as u8).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.extend_from_slice(&data);
    }
}

/// Represents packets sent from the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

const OFP_PACKET_OUT_LEN: usize = 8;

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        let data = match po.output_payload {
            Payload::Buffered(..) => 0,
            Payload::NotBuffered(ref buf) => buf.len(),
        };
        OFP_PACKET_OUT_LEN + Action::size_of_sequence(&po.apply_actions) + data
    }

    fn parse(buf: &[u8]) -> Result<PacketOut> {
        ensure_len("packet out", buf, OFP_PACKET_OUT_LEN)?;
        let mut bytes = Cursor::new(buf);
        let buf_id = bytes.read_i32::<BigEndian>()?;
        let port_id = match PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)? {
            Some(PseudoPort::PhysicalPort(p)) => Some(p),
            _ => None,
        };
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        ensure_len("packet out actions", buf, OFP_PACKET_OUT_LEN + actions_len)?;
        let actions = Action::parse_sequence(&mut bytes, actions_len)?;
        Ok(PacketOut {
            output_payload: Payload::of_buffer_id(buf_id, rest(&mut bytes)),
            port_id: port_id,
            apply_actions: actions,
        })
    }

    fn marshal(po: PacketOut, bytes: &mut Vec<u8>) {
        let (buf_id, data) = match po.output_payload {
            Payload::Buffered(n, _) => (n as i32, vec![]),
            Payload::NotBuffered(data) => (-1, data),
        };
        bytes.write_i32::<BigEndian>(buf_id).unwrap();
        match po.port_id {
            Some(p) => bytes.write_u16::<BigEndian>(p).unwrap(),
            None => bytes.write_u16::<BigEndian>(OfpPort::OFPPNone as u16).unwrap(),
        }
        bytes.write_u16::<BigEndian>(Action::size_of_sequence(&po.apply_actions) as u16).unwrap();
        for act in Action::move_controller_last(po.apply_actions) {
            Action::marshal(act, bytes)
        }
        bytes.extend_from_slice(&data);
    }
}

/// STP state of a port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StpState {
    Listen,
    Learn,
    Forward,
    Block,
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortState {
    pub down: bool,
    pub stp_state: StpState,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        let stp_state = match (d >> 8) & 3 {
            0 => StpState::Listen,
            1 => StpState::Learn,
            2 => StpState::Forward,
            _ => StpState::Block,
        };
        PortState {
            down: test_bit(0, d as u64),
            stp_state: stp_state,
        }
    }

    fn to_int(st: PortState) -> u32 {
        (if st.down { 1 } else { 0 }) | ((st.stp_state as u32) << 8)
    }
}

/// Description of a physical port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    pub name: String,
    /// Raw `ofp_port_config` bits.
    pub config: u32,
    pub state: PortState,
}

const OFP_PHY_PORT_LEN: usize = 48;
const OFP_MAX_PORT_NAME_LEN: usize = 16;

impl PortDesc {
    /// Whether the port was administratively brought down (`OFPPC_PORT_DOWN`).
    pub fn admin_down(&self) -> bool {
        test_bit(0, self.config as u64)
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc> {
        let port_no = bytes.read_u16::<BigEndian>()?;
        let mut hw_addr = [0; 6];
        bytes.read_exact(&mut hw_addr)?;
        let mut name = [0; OFP_MAX_PORT_NAME_LEN];
        bytes.read_exact(&mut name)?;
        let name_len = name.iter().position(|&b| b == 0).unwrap_or(OFP_MAX_PORT_NAME_LEN);
        let config = bytes.read_u32::<BigEndian>()?;
        let state = PortState::of_int(bytes.read_u32::<BigEndian>()?);
        // curr, advertised, supported, peer
        bytes.consume(16);
        Ok(PortDesc {
            port_no: port_no,
            hw_addr: MacAddr(hw_addr),
            name: String::from_utf8_lossy(&name[..name_len]).into_owned(),
            config: config,
            state: state,
        })
    }

    fn marshal(pd: PortDesc, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(pd.port_no).unwrap();
        bytes.extend_from_slice(&pd.hw_addr.octets());
        let mut name = [0; OFP_MAX_PORT_NAME_LEN];
        let n = pd.name.len().min(OFP_MAX_PORT_NAME_LEN - 1);
        name[..n].copy_from_slice(&pd.name.as_bytes()[..n]);
        bytes.extend_from_slice(&name);
        bytes.write_u32::<BigEndian>(pd.config).unwrap();
        bytes.write_u32::<BigEndian>(PortState::to_int(pd.state)).unwrap();
        bytes.extend_from_slice(&[0; 16]);
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

/// A physical port has changed in the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        8 + OFP_PHY_PORT_LEN
    }

    fn parse(buf: &[u8]) -> Result<PortStatus> {
        ensure_len("port status", buf, 8 + OFP_PHY_PORT_LEN)?;
        let mut bytes = Cursor::new(buf);
        let reason = match bytes.read_u8()? {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            r => {
                return Err(Error::Malformed {
                    what: "port status reason",
                    detail: r.to_string(),
                })
            }
        };
        bytes.consume(7);
        let desc = PortDesc::parse(&mut bytes)?;
        Ok(PortStatus {
            reason: reason,
            desc: desc,
        })
    }

    fn marshal(ps: PortStatus, bytes: &mut Vec<u8>) {
        bytes.write_u8(ps.reason as u8).unwrap();
        bytes.extend_from_slice(&[0; 7]);
        PortDesc::marshal(ps.desc, bytes);
    }
}

/// Error reported by a switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    pub typ: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for ErrorMsg {
    fn size_of(err: &ErrorMsg) -> usize {
        4 + err.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg> {
        ensure_len("error", buf, 4)?;
        let mut bytes = Cursor::new(buf);
        let typ = bytes.read_u16::<BigEndian>()?;
        let code = bytes.read_u16::<BigEndian>()?;
        Ok(ErrorMsg {
            typ: typ,
            code: code,
            data: rest(&mut bytes),
        })
    }

    fn marshal(err: ErrorMsg, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(err.typ).unwrap();
        bytes.write_u16::<BigEndian>(err.code).unwrap();
        bytes.extend_from_slice(&err.data);
    }
}

/// Encapsulates handling of messages implementing `MessageType` trait.
pub mod message {
    use super::*;
    use crate::ofp_header::OfpHeader;
    use crate::ofp_message::OfpMessage;

    /// Abstractions of OpenFlow messages mapping to message codes.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Message {
        Hello,
        Error(ErrorMsg),
        EchoRequest(Vec<u8>),
        EchoReply(Vec<u8>),
        FeaturesReq,
        FeaturesReply(SwitchFeatures),
        FlowMod(FlowMod),
        PacketIn(PacketIn),
        PacketOut(PacketOut),
        PortStatus(PortStatus),
        /// A well-formed message the controller has no use for; the body is kept raw.
        Other(MsgCode, Vec<u8>),
    }

    impl Message {
        /// Map `Message` to associated OpenFlow message type code `MsgCode`.
        fn msg_code_of_message(msg: &Message) -> MsgCode {
            match *msg {
                Message::Hello => MsgCode::Hello,
                Message::Error(_) => MsgCode::Error,
                Message::EchoRequest(_) => MsgCode::EchoReq,
                Message::EchoReply(_) => MsgCode::EchoResp,
                Message::FeaturesReq => MsgCode::FeaturesReq,
                Message::FeaturesReply(_) => MsgCode::FeaturesResp,
                Message::FlowMod(_) => MsgCode::FlowMod,
                Message::PacketIn(_) => MsgCode::PacketIn,
                Message::PacketOut(_) => MsgCode::PacketOut,
                Message::PortStatus(_) => MsgCode::PortStatus,
                Message::Other(code, _) => code,
            }
        }

        /// Marshal the OpenFlow message `msg`.
        fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
            match msg {
                Message::Hello | Message::FeaturesReq => (),
                Message::Error(err) => ErrorMsg::marshal(err, bytes),
                Message::EchoRequest(buf) |
                Message::EchoReply(buf) |
                Message::Other(_, buf) => bytes.extend_from_slice(&buf),
                Message::FeaturesReply(sf) => SwitchFeatures::marshal(sf, bytes),
                Message::FlowMod(flow_mod) => FlowMod::marshal(flow_mod, bytes),
                Message::PacketIn(packet_in) => PacketIn::marshal(packet_in, bytes),
                Message::PacketOut(packet_out) => PacketOut::marshal(packet_out, bytes),
                Message::PortStatus(sts) => PortStatus::marshal(sts, bytes),
            }
        }
    }

    impl OfpMessage for Message {
        fn size_of(msg: &Message) -> usize {
            OfpHeader::size() +
            match *msg {
                Message::Hello | Message::FeaturesReq => 0,
                Message::Error(ref err) => ErrorMsg::size_of(err),
                Message::EchoRequest(ref buf) |
                Message::EchoReply(ref buf) |
                Message::Other(_, ref buf) => buf.len(),
                Message::FeaturesReply(ref sf) => SwitchFeatures::size_of(sf),
                Message::FlowMod(ref flow_mod) => FlowMod::size_of(flow_mod),
                Message::PacketIn(ref packet_in) => PacketIn::size_of(packet_in),
                Message::PacketOut(ref packet_out) => PacketOut::size_of(packet_out),
                Message::PortStatus(ref ps) => PortStatus::size_of(ps),
            }
        }

        fn header_of(xid: u32, msg: &Message) -> OfpHeader {
            let sizeof_buf = Self::size_of(msg);
            OfpHeader::new(OFP_VERSION,
                           Self::msg_code_of_message(msg) as u8,
                           sizeof_buf as u16,
                           xid)
        }

        fn marshal(xid: u32, msg: Message) -> Vec<u8> {
            let hdr = Self::header_of(xid, &msg);
            let mut bytes = Vec::with_capacity(hdr.length());
            OfpHeader::marshal(&mut bytes, hdr);
            Message::marshal_body(msg, &mut bytes);
            bytes
        }

        fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message)> {
            if header.version() != OFP_VERSION {
                return Err(Error::UnsupportedVersion(header.version()));
            }
            let typ = header.type_code().ok_or_else(|| Error::UnknownMessage(header.raw_type()))?;
            let msg = match typ {
                MsgCode::Hello => Message::Hello,
                MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
                MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
                MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
                MsgCode::FeaturesReq => Message::FeaturesReq,
                MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
                MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
                MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
                MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
                MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
                code => Message::Other(code, buf.to_vec()),
            };
            Ok((header.xid(), msg))
        }
    }

    /// Return a `FlowMod` adding a permanent flow parameterized by the given `priority`,
    /// `pattern`, and `actions`.
    pub fn add_flow(prio: u16, pattern: Pattern, actions: Vec<Action>) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern: pattern,
            priority: prio,
            actions: actions,
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            out_port: None,
            apply_to_packet: None,
            check_overlap: false,
        }
    }

    /// Return a `FlowMod` removing every entry of the flow table.
    pub fn delete_all_flows() -> FlowMod {
        FlowMod {
            command: FlowModCmd::DeleteFlow,
            pattern: Pattern::match_all(),
            priority: 0,
            actions: vec![],
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            out_port: None,
            apply_to_packet: None,
            check_overlap: false,
        }
    }
}
