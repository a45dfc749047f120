use std::io;

use thiserror::Error;

pub const RAW_SOCKET_HINT: &str =
    "raw ICMP sockets require root or the CAP_NET_RAW capability";

#[derive(Debug, Error)]
pub enum PingError {
    #[error("permission denied opening raw socket: {hint}")]
    Permission { hint: &'static str },

    #[error("cannot resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("malformed packet: {0}")]
    Parse(#[from] ParseError),

    #[error("request timed out")]
    Timeout,
}

impl PingError {
    /// Classify a failure to create the raw channel.
    pub fn from_socket_error(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => PingError::Permission {
                hint: RAW_SOCKET_HINT,
            },
            _ => PingError::Transport(err),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short ({len} bytes)")]
    Truncated { len: usize },

    #[error("unsupported IP version {0}")]
    UnsupportedIpVersion(u8),

    #[error("bad ICMP checksum (residue {residue:#06x})")]
    BadChecksum { residue: u16 },

    #[error("ICMP type {icmp_type} is not an echo message")]
    NotEcho { icmp_type: u8 },

    #[error("undecodable header: {0}")]
    Malformed(String),
}
