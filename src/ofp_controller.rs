use std::net::TcpStream;

use crate::error::Result;
use crate::ofp_message::OfpMessage;

/// OpenFlow Controller
///
/// Version-agnostic API for implementing an OpenFlow controller.
pub trait OfpController {
    /// OpenFlow message type supporting the same protocol version as the controller.
    type Message: OfpMessage;

    /// Perform handshake and begin loop reading incoming messages from client stream.
    /// Returns once the switch hangs up.
    fn handle_client_connected(&self, stream: TcpStream) -> Result<()>;
}

pub mod openflow0x01 {
    use std::io::{ErrorKind, Read, Write};
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use log::{debug, info, warn};
    use parking_lot::Mutex;

    use super::OfpController;
    use crate::dispatcher::{self, Controller, PortState};
    use crate::error::{Error, Result};
    use crate::ofp_message::OfpMessage;
    use crate::openflow0x01::message::{add_flow, delete_all_flows, Message};
    use crate::openflow0x01::{Action, PacketIn, PacketOut, Pattern, Payload, PortReason,
                              PortStatus, PseudoPort, StpState, DEFAULT_PRIORITY};
    use crate::southbound::{Command, Datapath, FrameData, Output};

    /// Write one OpenFlow 1.0 message to `stream`.
    pub fn send_message<W: Write>(stream: &mut W, xid: u32, msg: Message) -> Result<()> {
        Message::write_to(stream, xid, msg)
    }

    /// Read one OpenFlow 1.0 message from `stream`.
    pub fn read_message<R: Read>(stream: &mut R) -> Result<(u32, Message)> {
        Message::read_from(stream)
    }

    /// Translate a southbound command into the OpenFlow 1.0 message that carries it.
    pub fn message_of_command(cmd: Command) -> Message {
        match cmd {
            Command::InstallRule { in_port, dl_dst, out_port, .. } => {
                let pattern = Pattern {
                    in_port: Some(in_port),
                    dl_dst: Some(dl_dst),
                    ..Pattern::match_all()
                };
                let actions = vec![Action::Output(PseudoPort::PhysicalPort(out_port))];
                Message::FlowMod(add_flow(DEFAULT_PRIORITY, pattern, actions))
            }
            Command::DeleteAllRules { .. } => Message::FlowMod(delete_all_flows()),
            Command::SendFrame { in_port, output, data, .. } => {
                let apply_actions = match output {
                    Output::Port(p) => vec![Action::Output(PseudoPort::PhysicalPort(p))],
                    Output::Flood => vec![Action::Output(PseudoPort::Flood)],
                    Output::Drop => vec![],
                };
                let output_payload = match data {
                    FrameData::Buffered(id) => Payload::Buffered(id, vec![]),
                    FrameData::Raw(bytes) => Payload::NotBuffered(bytes),
                };
                Message::PacketOut(PacketOut {
                    output_payload: output_payload,
                    port_id: in_port,
                    apply_actions: apply_actions,
                })
            }
        }
    }

    /// Write half of a switch connection, shared by the session loop and the
    /// datapath handle.
    struct Channel {
        stream: Mutex<TcpStream>,
        next_xid: AtomicU32,
    }

    impl Channel {
        fn send(&self, msg: Message) -> Result<()> {
            let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
            self.reply(xid, msg)
        }

        fn reply(&self, xid: u32, msg: Message) -> Result<()> {
            send_message(&mut *self.stream.lock(), xid, msg)
        }
    }

    /// Handle to a connected OpenFlow 1.0 switch.
    pub struct OfpDatapath {
        id: u64,
        channel: Arc<Channel>,
    }

    impl Datapath for OfpDatapath {
        fn id(&self) -> u64 {
            self.id
        }

        fn send(&self, cmd: Command) -> Result<()> {
            self.channel.send(message_of_command(cmd)).map_err(|e| match e {
                Error::Io(ref io) if io.kind() == ErrorKind::BrokenPipe => {
                    Error::ChannelClosed(self.id)
                }
                e => e,
            })
        }
    }

    fn port_state_of(ps: &PortStatus) -> PortState {
        if ps.reason == PortReason::PortDelete || ps.desc.state.down || ps.desc.admin_down() {
            PortState::Down
        } else if ps.desc.state.stp_state == StpState::Block {
            PortState::Blocked
        } else {
            PortState::Up
        }
    }

    fn packet_in_of(switch: u64, pi: PacketIn) -> dispatcher::PacketIn {
        let (buffer_id, frame) = match pi.input_payload {
            Payload::Buffered(id, frame) => (Some(id), frame),
            Payload::NotBuffered(frame) => (None, frame),
        };
        dispatcher::PacketIn {
            switch: switch,
            in_port: pi.port,
            frame: frame,
            buffer_id: buffer_id,
        }
    }

    impl Controller {
        fn serve(&self, mut reader: TcpStream, channel: Arc<Channel>) -> Result<Option<u64>> {
            let mut dp: Option<Arc<dyn Datapath>> = None;
            channel.send(Message::Hello)?;
            channel.send(Message::FeaturesReq)?;
            loop {
                let (xid, msg) = match read_message(&mut reader) {
                    Ok(m) => m,
                    Err(Error::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                    Err(Error::Io(e)) => return Err(Error::Io(e)),
                    Err(e) => {
                        warn!("openflow: skipping message: {}", e);
                        continue;
                    }
                };
                match msg {
                    Message::Hello => debug!("openflow: hello"),
                    Message::EchoRequest(data) => channel.reply(xid, Message::EchoReply(data))?,
                    Message::FeaturesReply(features) => {
                        let id = features.datapath_id;
                        info!("openflow: switch s{} connected with {} ports",
                              id,
                              features.ports.len());
                        let handle: Arc<dyn Datapath> = Arc::new(OfpDatapath {
                            id: id,
                            channel: Arc::clone(&channel),
                        });
                        self.switch_connected(&handle);
                        for port in &features.ports {
                            let ps = PortStatus {
                                reason: PortReason::PortAdd,
                                desc: port.clone(),
                            };
                            let state = port_state_of(&ps);
                            if state != PortState::Up {
                                self.port_state_changed(id, port.port_no, state);
                            }
                        }
                        dp = Some(handle);
                    }
                    Message::PacketIn(pi) => {
                        match dp {
                            Some(ref dp) => {
                                let pkt = packet_in_of(dp.id(), pi);
                                self.packet_in(dp, &pkt);
                            }
                            None => warn!("openflow: packet-in before features reply, ignored"),
                        }
                    }
                    Message::PortStatus(ps) => {
                        match dp {
                            Some(ref dp) => {
                                self.port_state_changed(dp.id(), ps.desc.port_no, port_state_of(&ps))
                            }
                            None => warn!("openflow: port status before features reply, ignored"),
                        }
                    }
                    Message::Error(err) => {
                        warn!("openflow: switch error type {} code {} ({} bytes of data)",
                              err.typ,
                              err.code,
                              err.data.len())
                    }
                    other => debug!("openflow: ignoring {:?}", other),
                }
            }
            Ok(dp.map(|dp| dp.id()))
        }
    }

    impl OfpController for Controller {
        type Message = Message;

        fn handle_client_connected(&self, stream: TcpStream) -> Result<()> {
            let peer = stream.peer_addr()?;
            let channel = Arc::new(Channel {
                stream: Mutex::new(stream.try_clone()?),
                next_xid: AtomicU32::new(1),
            });
            let served = self.serve(stream, channel);
            let id = match served {
                Ok(id) => id,
                Err(e) => {
                    warn!("openflow: connection {} failed: {}", peer, e);
                    None
                }
            };
            match id {
                Some(id) => self.switch_disconnected(id),
                None => info!("openflow: connection {} closed before handshake", peer),
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::openflow0x01::{PortDesc, PortState as WirePortState, Timeout};
        use crate::packet::MacAddr;

        fn status(reason: PortReason, down: bool, stp_state: StpState) -> PortStatus {
            PortStatus {
                reason: reason,
                desc: PortDesc {
                    port_no: 2,
                    hw_addr: MacAddr::default(),
                    name: "s1-eth2".to_string(),
                    config: 0,
                    state: WirePortState {
                        down: down,
                        stp_state: stp_state,
                    },
                },
            }
        }

        #[test]
        fn install_rule_becomes_permanent_flow_mod() {
            let dst = MacAddr([0, 4, 0, 0, 0, 2]);
            match message_of_command(Command::InstallRule {
                switch: 1,
                in_port: 1,
                dl_dst: dst,
                out_port: 2,
            }) {
                Message::FlowMod(fm) => {
                    assert_eq!(fm.pattern.in_port, Some(1));
                    assert_eq!(fm.pattern.dl_dst, Some(dst));
                    assert_eq!(fm.pattern.dl_src, None);
                    assert_eq!(fm.actions, vec![Action::Output(PseudoPort::PhysicalPort(2))]);
                    assert_eq!(fm.idle_timeout, Timeout::Permanent);
                    assert_eq!(fm.hard_timeout, Timeout::Permanent);
                }
                other => panic!("expected flow mod, got {:?}", other),
            }
        }

        #[test]
        fn drop_is_an_empty_action_list() {
            match message_of_command(Command::SendFrame {
                switch: 1,
                in_port: Some(3),
                output: Output::Drop,
                data: FrameData::Buffered(9),
            }) {
                Message::PacketOut(po) => {
                    assert!(po.apply_actions.is_empty());
                    assert_eq!(po.port_id, Some(3));
                    assert_eq!(po.output_payload, Payload::Buffered(9, vec![]));
                }
                other => panic!("expected packet out, got {:?}", other),
            }
        }

        #[test]
        fn port_status_maps_to_port_state() {
            assert_eq!(port_state_of(&status(PortReason::PortModify, false, StpState::Forward)),
                       PortState::Up);
            assert_eq!(port_state_of(&status(PortReason::PortModify, true, StpState::Forward)),
                       PortState::Down);
            assert_eq!(port_state_of(&status(PortReason::PortDelete, false, StpState::Forward)),
                       PortState::Down);
            assert_eq!(port_state_of(&status(PortReason::PortModify, false, StpState::Block)),
                       PortState::Blocked);
        }

        #[test]
        fn reader_skips_nothing_on_valid_stream() {
            let mut wire = vec![];
            send_message(&mut wire, 5, Message::EchoRequest(vec![1, 2])).unwrap();
            send_message(&mut wire, 6, Message::Hello).unwrap();
            let mut cursor = std::io::Cursor::new(wire);
            assert_eq!(read_message(&mut cursor).unwrap(),
                       (5, Message::EchoRequest(vec![1, 2])));
            assert_eq!(read_message(&mut cursor).unwrap(), (6, Message::Hello));
            assert!(read_message(&mut cursor).is_err());
        }
    }
}
