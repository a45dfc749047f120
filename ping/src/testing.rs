//! In-memory stand-in for the raw socket.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    net::{IpAddr, Ipv4Addr},
    rc::Rc,
    time::Duration,
};

use crate::{
    error::{PingError, RAW_SOCKET_HINT},
    packet::{synthesize_reply, ICMP_ECHO_REPLY, REQUEST_LEN},
    prober::{ChannelFactory, EchoChannel},
};

pub const TARGET: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

/// Delay before delivery (counted from the previous delivery or the send)
/// and the raw datagram.
pub type Delivery = (Duration, Vec<u8>);
type Responder = dyn Fn(u16, u16) -> Vec<Delivery>;

#[derive(Clone)]
pub struct ScriptedFactory {
    responder: Rc<Responder>,
    deny: bool,
    max_send: usize,
    /// 1-based index of the probe whose send fails
    fail_send_on: Option<usize>,
    /// 1-based index of the probe whose receive fails
    fail_recv_on: Option<usize>,
    opened: Rc<Cell<usize>>,
    /// Every complete request written, one entry per probe
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub closed: Rc<Cell<usize>>,
}

impl ScriptedFactory {
    pub fn new(responder: impl Fn(u16, u16) -> Vec<Delivery> + 'static) -> Self {
        Self {
            responder: Rc::new(responder),
            deny: false,
            max_send: usize::MAX,
            fail_send_on: None,
            fail_recv_on: None,
            opened: Rc::default(),
            sent: Rc::default(),
            closed: Rc::default(),
        }
    }

    /// A peer answering every request after `after`.
    pub fn echoing(after: Duration) -> Self {
        Self::new(move |id, seq| {
            vec![(after, synthesize_reply(ICMP_ECHO_REPLY, id, seq, 64))]
        })
    }

    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::silent()
        }
    }

    /// Cap how many bytes a single send accepts.
    pub fn with_max_send(mut self, max_send: usize) -> Self {
        self.max_send = max_send;
        self
    }

    pub fn with_send_failure(mut self, probe: usize) -> Self {
        self.fail_send_on = Some(probe);
        self
    }

    pub fn with_recv_failure(mut self, probe: usize) -> Self {
        self.fail_recv_on = Some(probe);
        self
    }

    /// Sequence numbers of every request written so far.
    pub fn sent_sequences(&self) -> Vec<u16> {
        self.sent
            .borrow()
            .iter()
            .map(|p| u16::from_be_bytes([p[6], p[7]]))
            .collect()
    }
}

impl ChannelFactory for ScriptedFactory {
    type Channel = ScriptedChannel;

    fn open(&self) -> Result<ScriptedChannel, PingError> {
        if self.deny {
            return Err(PingError::Permission {
                hint: RAW_SOCKET_HINT,
            });
        }
        self.opened.set(self.opened.get() + 1);
        Ok(ScriptedChannel {
            probe: self.opened.get(),
            factory: self.clone(),
            outgoing: Vec::new(),
            pending: VecDeque::new(),
        })
    }
}

pub struct ScriptedChannel {
    probe: usize,
    factory: ScriptedFactory,
    outgoing: Vec<u8>,
    pending: VecDeque<Delivery>,
}

impl EchoChannel for ScriptedChannel {
    async fn send_to(
        &mut self,
        packet: &[u8],
        _addr: Ipv4Addr,
    ) -> io::Result<usize> {
        if self.factory.fail_send_on == Some(self.probe) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "network is unreachable",
            ));
        }
        let n = packet.len().min(self.factory.max_send);
        self.outgoing.extend_from_slice(&packet[..n]);
        if self.outgoing.len() == REQUEST_LEN {
            let request = std::mem::take(&mut self.outgoing);
            let id = u16::from_be_bytes([request[4], request[5]]);
            let seq = u16::from_be_bytes([request[6], request[7]]);
            self.pending.extend((self.factory.responder)(id, seq));
            self.factory.sent.borrow_mut().push(request);
        }
        Ok(n)
    }

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<(usize, IpAddr)> {
        if self.factory.fail_recv_on == Some(self.probe) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            ));
        }
        match self.pending.pop_front() {
            Some((after, datagram)) => {
                tokio::time::sleep(after).await;
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok((datagram.len(), IpAddr::V4(TARGET)))
            }
            None => std::future::pending().await,
        }
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        self.factory.closed.set(self.factory.closed.get() + 1);
    }
}
