use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use common::{AsyncICMPSocket, ICMPSocket};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::{error::PingError, packet, stats::round_to};

/// Large enough for any reply on an ethernet sized MTU
const RECV_BUF_LEN: usize = 1500;

/// A datagram channel carrying raw ICMP.
#[allow(async_fn_in_trait)]
pub trait EchoChannel {
    async fn send_to(
        &mut self,
        packet: &[u8],
        addr: Ipv4Addr,
    ) -> io::Result<usize>;
    /// Read one datagram, IPv4 header included.
    async fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<(usize, IpAddr)>;
}

/// Opens one channel per probe.
pub trait ChannelFactory {
    type Channel: EchoChannel;
    fn open(&self) -> Result<Self::Channel, PingError>;
}

impl EchoChannel for AsyncICMPSocket {
    async fn send_to(
        &mut self,
        packet: &[u8],
        addr: Ipv4Addr,
    ) -> io::Result<usize> {
        AsyncICMPSocket::send_to(self, packet, addr).await
    }

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<(usize, IpAddr)> {
        AsyncICMPSocket::recv_from(self, buf).await
    }
}

pub struct RawSocketFactory {
    /// Interface to bind to
    iface: Option<String>,
}

impl RawSocketFactory {
    pub fn new(iface: Option<String>) -> Self {
        Self { iface }
    }
}

impl ChannelFactory for RawSocketFactory {
    type Channel = AsyncICMPSocket;

    fn open(&self) -> Result<AsyncICMPSocket, PingError> {
        let socket = ICMPSocket::new(self.iface.as_deref())
            .map_err(PingError::from_socket_error)?;
        Ok(AsyncICMPSocket::new(socket)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub rtt: Duration,
    pub source: IpAddr,
    pub ttl: u8,
    pub byte_count: usize,
}

/// Outcome of one probe cycle. `reply` is `None` when it timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub sequence: u16,
    pub reply: Option<Reply>,
}

impl ProbeResult {
    pub fn timed_out(&self) -> bool {
        self.reply.is_none()
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reply {
            Some(reply) => write!(
                f,
                "{} bytes from {}: icmp_seq={} ttl={} time={} ms",
                reply.byte_count,
                reply.source,
                self.sequence,
                reply.ttl,
                round_to(reply.rtt.as_secs_f64() * 1000.0, 4)
            ),
            None => write!(f, "Request timed out"),
        }
    }
}

pub struct Prober<F> {
    factory: F,
}

impl<F: ChannelFactory> Prober<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Send one echo request and wait up to `timeout` for its reply.
    pub async fn probe_once(
        &self,
        target: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        timeout: Duration,
    ) -> Result<ProbeResult, PingError> {
        self.transmit(target, identifier, sequence, timeout)
            .await?
            .wait()
            .await
    }

    /// Open a channel and put the whole echo request on the wire.
    ///
    /// The returned [`InFlight`] owns the channel; it is released when the
    /// probe completes or the value is dropped.
    pub async fn transmit(
        &self,
        target: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        timeout: Duration,
    ) -> Result<InFlight<F::Channel>, PingError> {
        let mut channel = self.factory.open()?;
        let packet = packet::build_echo_request(identifier, sequence);

        let mut unsent = packet.as_slice();
        while !unsent.is_empty() {
            let n = channel.send_to(unsent, target).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            unsent = &unsent[n..];
        }
        let sent_at = Instant::now();
        trace!(%target, identifier, sequence, len = packet.len(), "echo request sent");

        Ok(InFlight {
            channel,
            identifier,
            sequence,
            sent_at,
            deadline: sent_at + timeout,
        })
    }
}

/// A transmitted probe awaiting its reply.
pub struct InFlight<C> {
    channel: C,
    identifier: u16,
    sequence: u16,
    sent_at: Instant,
    deadline: Instant,
}

impl<C: EchoChannel> InFlight<C> {
    pub async fn wait(mut self) -> Result<ProbeResult, PingError> {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let recv = self.channel.recv_from(&mut buf);
            let (len, source) = match time::timeout_at(self.deadline, recv).await
            {
                Ok(res) => res?,
                Err(_elapsed) => return Ok(self.lost()),
            };
            let received_at = Instant::now();

            match packet::parse_echo_reply(&buf[..len]) {
                Ok(reply) if reply.answers(self.identifier) => {
                    return Ok(ProbeResult {
                        sequence: self.sequence,
                        reply: Some(Reply {
                            rtt: received_at - self.sent_at,
                            source,
                            ttl: reply.ttl,
                            byte_count: reply.byte_count,
                        }),
                    });
                }
                Ok(reply) => debug!(
                    %source,
                    icmp_type = reply.icmp_type,
                    identifier = reply.identifier,
                    sequence = reply.sequence,
                    "discarding icmp packet not addressed to this probe"
                ),
                Err(err) => {
                    debug!(%source, len, %err, "discarding malformed packet")
                }
            }

            if received_at >= self.deadline {
                return Ok(self.lost());
            }
        }
    }

    fn lost(&self) -> ProbeResult {
        debug!(sequence = self.sequence, "request timed out");
        ProbeResult {
            sequence: self.sequence,
            reply: None,
        }
    }
}
