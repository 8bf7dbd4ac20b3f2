use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::ofp_header::OfpHeader;

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`, header included.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(xid: u32, msg: &Self) -> OfpHeader;
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: u32, msg: Self) -> Vec<u8>;
    /// Returns a pair `(u32, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and message body `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Self)>;

    /// Write `msg` to `stream` under transaction id `xid`.
    fn write_to<W: Write>(stream: &mut W, xid: u32, msg: Self) -> Result<()> {
        stream.write_all(&Self::marshal(xid, msg))?;
        Ok(())
    }

    /// Read one framed message from `stream`. The whole message is consumed
    /// even when its body fails to parse, so the stream stays framed.
    fn read_from<R: Read>(stream: &mut R) -> Result<(u32, Self)> {
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf)?;
        let header = OfpHeader::parse(&buf)?;
        if header.length() < OfpHeader::size() {
            return Err(Error::Malformed {
                what: "OpenFlow header",
                detail: format!("length {}", header.length()),
            });
        }
        let mut body = vec![0; header.length() - OfpHeader::size()];
        stream.read_exact(&mut body)?;
        Self::parse(&header, &body)
    }
}
