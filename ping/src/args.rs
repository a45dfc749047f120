use std::time::Duration;

use clap::Parser;

use ping::SessionConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opts {
    /// Host name or IPv4 address to ping
    pub host: String,
    /// Number of echo requests to send, 0 sends until interrupted
    #[arg(long, short, default_value = "0")]
    pub count: u64,
    /// Time to wait for each reply in seconds
    #[arg(long, short = 'W', default_value = "1", value_parser = parse_timeout)]
    pub timeout: Duration,
    /// Interval between packets in seconds
    #[arg(long, short, default_value = "1", value_parser = parse_interval)]
    pub interval: Duration,
    /// Interface to bind to
    #[arg(long, short = 'I')]
    pub iface: Option<String>,
    /// Increase diagnostic output on stderr (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Opts {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            count: (self.count > 0).then_some(self.count),
            timeout: self.timeout,
            interval: self.interval,
        }
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("`{}` is not a valid number of seconds", s));
    }
    Ok(secs)
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs = parse_seconds(s)?;
    if secs == 0.0 {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    parse_seconds(s).map(Duration::from_secs_f64)
}
