use std::{
    io::Write,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use tokio::{
    net,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    error::PingError,
    packet::PAYLOAD_LEN,
    prober::{ChannelFactory, ProbeResult, Prober},
    stats::SessionStats,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHost {
    pub hostname: String,
    pub address: Ipv4Addr,
}

/// Resolve `host` to its first IPv4 address. Numeric addresses skip the
/// resolver.
pub async fn resolve(host: &str) -> Result<TargetHost, PingError> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(TargetHost {
            hostname: host.to_string(),
            address,
        });
    }

    let address = net::lookup_host((host, 0))
        .await
        .map_err(|e| resolution_error(host, e.to_string()))?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| resolution_error(host, "no IPv4 address".to_string()))?;

    Ok(TargetHost {
        hostname: host.to_string(),
        address,
    })
}

fn resolution_error(host: &str, reason: String) -> PingError {
    PingError::Resolution {
        host: host.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// `None` pings until stopped
    pub count: Option<u64>,
    pub timeout: Duration,
    /// Minimum time between the start of two probes
    pub interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            count: None,
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running { identifier: u16 },
    Finished,
}

/// Drives sequential probes against one target and reports on them.
pub struct Session<F> {
    target: TargetHost,
    config: SessionConfig,
    prober: Prober<F>,
    stats: SessionStats,
    state: SessionState,
}

impl<F: ChannelFactory> Session<F> {
    pub fn new(target: TargetHost, config: SessionConfig, factory: F) -> Self {
        Self {
            target,
            config,
            prober: Prober::new(factory),
            stats: SessionStats::new(),
            state: SessionState::Idle,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Probe until the configured count is reached or `stop` is cancelled,
    /// then write the summary.
    ///
    /// A fatal error ends the session without a summary. Running a finished
    /// session does nothing.
    pub async fn run<W: Write>(
        &mut self,
        stop: &CancellationToken,
        out: &mut W,
    ) -> Result<(), PingError> {
        if self.state == SessionState::Finished {
            return Ok(());
        }
        let identifier = rand::random::<u16>();
        self.state = SessionState::Running { identifier };

        let outcome = self.probe_loop(identifier, stop, out).await;
        self.state = SessionState::Finished;
        outcome?;

        writeln!(out)?;
        writeln!(out, "{}", self.stats.summarize(&self.target.hostname))?;
        Ok(())
    }

    async fn probe_loop<W: Write>(
        &mut self,
        identifier: u16,
        stop: &CancellationToken,
        out: &mut W,
    ) -> Result<(), PingError> {
        writeln!(
            out,
            "PING {} ({}): {} data bytes",
            self.target.hostname, self.target.address, PAYLOAD_LEN
        )?;

        let mut sequence: u16 = 1;
        let mut probes: u64 = 0;
        loop {
            if stop.is_cancelled() {
                info!("stop requested");
                break;
            }
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!(sequence, "stop requested, abandoning probe");
                    break;
                }
                result = self.cycle(identifier, sequence) => result?,
            };

            writeln!(out, "{}", result)?;
            self.stats.record_result(&result);

            probes += 1;
            sequence = sequence.wrapping_add(1);
            if self.config.count.is_some_and(|count| probes >= count) {
                break;
            }

            let pause = self.config.interval.saturating_sub(started.elapsed());
            if !pause.is_zero() {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        info!("stop requested");
                        break;
                    }
                    _ = time::sleep(pause) => {}
                }
            }
        }
        Ok(())
    }

    async fn cycle(
        &mut self,
        identifier: u16,
        sequence: u16,
    ) -> Result<ProbeResult, PingError> {
        let in_flight = self
            .prober
            .transmit(
                self.target.address,
                identifier,
                sequence,
                self.config.timeout,
            )
            .await?;
        self.stats.record_sent();
        in_flight.wait().await
    }
}
