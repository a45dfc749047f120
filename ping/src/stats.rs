use std::time::Duration;

use common::Statistics;

use crate::prober::ProbeResult;

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Latency figures in milliseconds, rounded for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub stddev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub transmitted: u64,
    pub received: u64,
    pub loss_percent: f64,
    /// `None` when no reply was ever received
    pub latency: Option<Latency>,
}

/// Counters and round-trip times for one ping session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    transmitted: u64,
    received: u64,
    rtts: Vec<Duration>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }
    pub fn received(&self) -> u64 {
        self.received
    }
    pub fn rtts(&self) -> &[Duration] {
        &self.rtts
    }

    pub fn record_sent(&mut self) {
        self.transmitted += 1;
    }

    pub fn record_result(&mut self, result: &ProbeResult) {
        if let Some(reply) = &result.reply {
            self.received += 1;
            self.rtts.push(reply.rtt);
        }
        debug_assert!(self.received <= self.transmitted);
    }

    /// Zero probes sent counts as no loss.
    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            return 0.0;
        }
        let ratio = self.received as f64 / self.transmitted as f64;
        round_to((1.0 - ratio) * 100.0, 4)
    }

    pub fn summary(&self) -> Summary {
        let stats: Statistics = self
            .rtts
            .iter()
            .map(|rtt| rtt.as_secs_f64() * 1000.0)
            .collect();
        let latency = (!stats.is_empty()).then(|| Latency {
            min: round_to(stats.min(), 5),
            avg: round_to(stats.mean(), 5),
            max: round_to(stats.max(), 5),
            stddev: round_to(stats.standard_deviation(), 5),
        });
        Summary {
            transmitted: self.transmitted,
            received: self.received,
            loss_percent: self.loss_percent(),
            latency,
        }
    }

    pub fn summarize(&self, host: &str) -> String {
        let summary = self.summary();
        let latency = match summary.latency {
            Some(l) => format!("{}/{}/{}/{} ms", l.min, l.avg, l.max, l.stddev),
            None => "no data".to_string(),
        };
        format!(
            "--- {} ping statistics ---\n\
             {} packets transmitted, {} packets received, {}% packet loss\n\
             round-trip min/avg/max/stddev = {}",
            host,
            summary.transmitted,
            summary.received,
            summary.loss_percent,
            latency
        )
    }
}
