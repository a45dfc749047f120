use std::{
    io,
    mem::MaybeUninit,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    os::unix::io::{AsRawFd, RawFd},
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;
use tracing::trace;

// Strong type for a raw IPv4 ICMP socket
pub struct ICMPSocket(Socket);

impl ICMPSocket {
    /// Open a non-blocking raw ICMP socket, optionally bound to an interface.
    ///
    /// Raw sockets need elevated privileges, so the caller should expect
    /// `io::ErrorKind::PermissionDenied` here.
    pub fn new(bind_interface: Option<&str>) -> io::Result<ICMPSocket> {
        let socket =
            Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.set_nonblocking(true)?;

        let socket = match bind_interface {
            Some(bi) => bind_to_device(socket, bi)?,
            None => socket,
        };
        trace!(fd = socket.as_raw_fd(), "opened raw icmp socket");

        Ok(ICMPSocket(socket))
    }
    pub fn get_ref(&self) -> &Socket {
        &self.0
    }
}

impl AsRawFd for ICMPSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl Drop for ICMPSocket {
    fn drop(&mut self) {
        trace!(fd = self.0.as_raw_fd(), "closing raw icmp socket");
    }
}

pub struct AsyncICMPSocket {
    inner: AsyncFd<ICMPSocket>,
}

impl AsyncICMPSocket {
    pub fn new(socket: ICMPSocket) -> io::Result<Self> {
        Ok(Self {
            inner: AsyncFd::new(socket)?,
        })
    }

    /// Send one datagram, returning how many bytes the kernel accepted.
    pub async fn send_to(
        &mut self,
        packet: &[u8],
        addr: Ipv4Addr,
    ) -> io::Result<usize> {
        // ICMP has no ports, the kernel ignores the value
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(addr, 0)));
        loop {
            let mut guard = self.inner.writable().await?;
            match guard
                .try_io(|inner| inner.get_ref().get_ref().send_to(packet, &addr))
            {
                Ok(res) => return res,
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram (IPv4 header included) and its source address.
    pub async fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<(usize, IpAddr)> {
        loop {
            let mut guard = self.inner.readable().await?;
            // Safety: recv only ever writes initialised bytes into the buffer,
            // and an initialised [u8] is a valid [MaybeUninit<u8>]
            let uninit_slice = unsafe {
                &mut *(&mut *buf as *mut [u8] as *mut [MaybeUninit<u8>])
            };

            match guard.try_io(|inner| {
                inner.get_ref().get_ref().recv_from(&mut *uninit_slice)
            }) {
                Ok(Ok((n, addr))) => {
                    let source = addr
                        .as_socket()
                        .map(|sa| sa.ip())
                        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                    return Ok((n, source));
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}

pub fn bind_to_device(
    socket: Socket,
    bind_interface: &str,
) -> Result<Socket, std::io::Error> {
    // Socket2 bind_device does not have nice error types, so we have to handle
    // the libc errors. In case, we get an error when binding, map it into a
    // more friendly std::io::Error
    if let Err(err) = socket.bind_device(Some(bind_interface.as_bytes())) {
        return if matches!(err.raw_os_error(), Some(libc::ENODEV)) {
            let error_msg = format!(
                "error binding to device (`{}`): {}",
                bind_interface, err
            );
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, error_msg))
        } else if matches!(err.raw_os_error(), Some(libc::EPERM)) {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("binding to device (`{}`): {}", bind_interface, err),
            ))
        } else {
            let error_msg = format!("unexpected error binding device: {}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, error_msg))
        };
    }

    Ok(socket)
}

/// Online min/max/mean/variance accumulator (Welford).
#[derive(Debug, Clone)]
pub struct Statistics {
    mean: f64,
    variance: f64,
    min: f64,
    max: f64,
    samples: usize,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            mean: f64::NAN,
            variance: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            samples: 0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
    /// Population variance; NaN before the first sample.
    pub fn variance(&self) -> f64 {
        self.variance / ((self.samples) as f64)
    }
    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn samples(&self) -> usize {
        self.samples
    }
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn update(&mut self, value: f64) {
        self.samples += 1;
        if self.samples == 1 {
            self.mean = value;
            self.variance = 0.0;
            self.min = value;
            self.max = value;
        } else {
            let old_mean = self.mean;
            self.mean = old_mean + (value - old_mean) / self.samples as f64;
            self.variance =
                self.variance + (value - old_mean) * (value - self.mean);
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }
}

impl FromIterator<f64> for Statistics {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Statistics::new();
        for value in iter {
            stats.update(value);
        }
        stats
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stats_test() {
        let mut stats = Statistics::new();
        for value in 1..=10 {
            stats.update(value as f64);
        }

        assert_eq!(stats.mean(), 5.5);
        assert_eq!(stats.variance(), 8.25);
        assert_eq!(stats.standard_deviation().round(), 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.samples, 10);
    }

    #[test]
    fn constant_samples_have_zero_deviation() {
        let stats: Statistics = [0.5, 0.5, 0.5].into_iter().collect();
        assert_eq!(stats.mean(), 0.5);
        assert_eq!(stats.standard_deviation(), 0.0);
        assert_eq!(stats.min(), 0.5);
        assert_eq!(stats.max(), 0.5);
    }

    #[test]
    fn empty_stats_are_nan() {
        let stats = Statistics::new();
        assert!(stats.is_empty());
        assert!(stats.mean().is_nan());
        assert!(stats.standard_deviation().is_nan());
    }
}
