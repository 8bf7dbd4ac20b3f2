use std::io;

use thiserror::Error;

/// Errors raised by the OpenFlow codec and the session driver.
///
/// Routing fallbacks (no path, unknown ARP target, loop suppression,
/// unsupported frames) are not errors; they surface as a dispatch `Outcome`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("unsupported OpenFlow version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unknown OpenFlow message type {0}")]
    UnknownMessage(u8),

    #[error("malformed {what}: {detail}")]
    Malformed {
        what: &'static str,
        detail: String,
    },

    #[error("control channel to switch {0:#x} is closed")]
    ChannelClosed(u64),

    #[error("invalid link description `{0}`, expected <switch>:<port>-<switch>:<port>")]
    InvalidLink(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fail with `Error::Truncated` unless `buf` holds at least `need` bytes.
pub(crate) fn ensure_len(what: &'static str, buf: &[u8], need: usize) -> Result<()> {
    if buf.len() < need {
        Err(Error::Truncated {
            what: what,
            need: need,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}
