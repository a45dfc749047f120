//! ICMP echo probing: packet codec, single-probe protocol, session driver and
//! statistics.
pub mod error;
pub mod packet;
pub mod prober;
pub mod session;
pub mod stats;
#[cfg(test)]
mod testing;

pub use error::{ParseError, PingError};
pub use prober::{ChannelFactory, EchoChannel, ProbeResult, Prober, RawSocketFactory};
pub use session::{resolve, Session, SessionConfig, SessionState, TargetHost};
pub use stats::SessionStats;
