//! ICMP echo request construction and echo reply parsing.
//!
//! Requests are written without an IP header (the kernel prepends one), while
//! replies read from a raw socket still carry the 20 byte IPv4 header.

use etherparse::{
    IcmpEchoHeader, Icmpv4Header, Icmpv4Type, Ipv4HeaderSlice, ReadError,
};

use crate::error::ParseError;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

pub const ICMP_HEADER_LEN: usize = 8;
/// IPv4 header without options
pub const IPV4_HEADER_LEN: usize = 20;
pub const PAYLOAD_LEN: usize = 192;
pub const PAYLOAD_FILLER: u8 = b'Q';
pub const REQUEST_LEN: usize = ICMP_HEADER_LEN + PAYLOAD_LEN;

/// Internet checksum of `data`.
///
/// Byte pairs are accumulated as little-endian words, a trailing odd byte is
/// added on its own, carries are folded back into the low 16 bits, and the
/// complemented result is byte-swapped. The returned value is meant to be
/// written big-endian into the checksum field. Summing a packet that already
/// carries a valid checksum yields 0.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_le_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = words.remainder() {
        sum += *last as u64;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    (!(sum as u16)).swap_bytes()
}

pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let header = Icmpv4Header {
        icmp_type: Icmpv4Type::EchoRequest(IcmpEchoHeader {
            id: identifier,
            seq: sequence,
        }),
        checksum: 0,
    };
    let mut packet = Vec::with_capacity(REQUEST_LEN);
    packet.extend_from_slice(header.to_bytes().as_slice());
    packet.resize(REQUEST_LEN, PAYLOAD_FILLER);

    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

/// Decoded view of a received ICMP echo packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub ttl: u8,
    /// Length of the whole datagram, IP header included
    pub byte_count: usize,
}

impl EchoReply {
    /// Whether this is an echo reply sent to the session `identifier`.
    pub fn answers(&self, identifier: u16) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY && self.identifier == identifier
    }
}

pub fn parse_echo_reply(raw: &[u8]) -> Result<EchoReply, ParseError> {
    if raw.len() < IPV4_HEADER_LEN + ICMP_HEADER_LEN {
        return Err(ParseError::Truncated { len: raw.len() });
    }
    let ip = Ipv4HeaderSlice::from_slice(raw).map_err(|err| match err {
        ReadError::Ipv4UnexpectedVersion(version) => {
            ParseError::UnsupportedIpVersion(version)
        }
        other => ParseError::Malformed(other.to_string()),
    })?;

    let icmp = &raw[ip.slice().len()..];
    let residue = checksum(icmp);
    if residue != 0 {
        return Err(ParseError::BadChecksum { residue });
    }

    let (header, _payload) = Icmpv4Header::from_slice(icmp)
        .map_err(|err| ParseError::Malformed(err.to_string()))?;
    let echo = match header.icmp_type {
        Icmpv4Type::EchoReply(echo) | Icmpv4Type::EchoRequest(echo) => echo,
        _ => return Err(ParseError::NotEcho { icmp_type: icmp[0] }),
    };

    Ok(EchoReply {
        icmp_type: icmp[0],
        code: icmp[1],
        checksum: header.checksum,
        identifier: echo.id,
        sequence: echo.seq,
        ttl: ip.ttl(),
        byte_count: raw.len(),
    })
}

/// What a peer sends back for `build_echo_request(identifier, sequence)`,
/// including the IPv4 header a raw socket would hand us.
#[cfg(test)]
pub(crate) fn synthesize_reply(
    icmp_type: u8,
    identifier: u16,
    sequence: u16,
    ttl: u8,
) -> Vec<u8> {
    let mut icmp = build_echo_request(identifier, sequence);
    icmp[0] = icmp_type;
    icmp[2..4].copy_from_slice(&[0, 0]);
    let sum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&sum.to_be_bytes());

    let total_len = (IPV4_HEADER_LEN + icmp.len()) as u16;
    let mut packet = vec![0u8; IPV4_HEADER_LEN];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&total_len.to_be_bytes());
    packet[8] = ttl;
    packet[9] = 1; // ICMP
    packet[12..16].copy_from_slice(&[10, 0, 0, 1]);
    packet[16..20].copy_from_slice(&[10, 0, 0, 2]);
    packet.extend_from_slice(&icmp);
    packet
}
