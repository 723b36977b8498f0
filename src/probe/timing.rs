use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

/// A named sub-interval of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    ContentTransfer,
}

impl Phase {
    /// All phases in the order they occur on the wire.
    pub const ALL: [Phase; 5] = [
        Phase::DnsLookup,
        Phase::TcpConnection,
        Phase::TlsHandshake,
        Phase::ServerProcessing,
        Phase::ContentTransfer,
    ];

    /// The stable `details` key the phase is reported under.
    pub fn key(&self) -> &'static str {
        match self {
            Phase::DnsLookup => "dns_lookup_ms",
            Phase::TcpConnection => "tcp_connection_ms",
            Phase::TlsHandshake => "tls_handshake_ms",
            Phase::ServerProcessing => "server_processing_ms",
            Phase::ContentTransfer => "content_transfer_ms",
        }
    }
}

pub const TOTAL_TIME_KEY: &str = "total_time_ms";

/// Converts a duration to whole milliseconds, reported as a float.
pub fn millis(duration: Duration) -> f64 {
    duration.as_millis() as f64
}

/// Wall-clock instrumentation for one probe.
///
/// The timer is created right before the request is built. Phases are appended
/// as they complete, so the recorded order is the order of occurrence. The
/// total is measured from the start marker and never derived from the phases.
#[derive(Debug)]
pub struct PhaseTimer {
    started: Instant,
    phases: Vec<(Phase, Duration)>,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            phases: Vec::with_capacity(Phase::ALL.len()),
        }
    }

    /// Records `phase` as the time elapsed since `marker`.
    pub fn record_since(&mut self, phase: Phase, marker: Instant) {
        self.record(phase, marker.elapsed());
    }

    pub fn record(&mut self, phase: Phase, duration: Duration) {
        self.phases.push((phase, duration));
    }

    /// Awaits `fut` and records how long it took under `phase`, whatever the outcome.
    pub async fn time<F: Future>(&mut self, phase: Phase, fut: F) -> F::Output {
        let marker = Instant::now();
        let output = fut.await;
        self.record_since(phase, marker);
        output
    }

    /// Time spent in `phase`, summed over every occurrence. A followed
    /// redirect runs the connection phases once per hop.
    pub fn get(&self, phase: Phase) -> Option<Duration> {
        self.phases
            .iter()
            .filter(|(recorded, _)| *recorded == phase)
            .map(|(_, duration)| *duration)
            .reduce(|sum, d| sum + d)
    }

    /// Phases in the order they were recorded, repeats included.
    pub fn recorded(&self) -> Vec<Phase> {
        self.phases.iter().map(|(phase, _)| *phase).collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Writes the phases that fired plus the given total into `details`.
    pub fn write_observed(&self, details: &mut Map<String, Value>, total: Duration) {
        for phase in self.recorded() {
            let duration = self.get(phase).unwrap_or_default();
            details.insert(phase.key().to_string(), millis(duration).into());
        }
        details.insert(TOTAL_TIME_KEY.to_string(), millis(total).into());
    }

    /// Writes every phase, reporting zero for the ones that never happened
    /// (no resolution for an IP literal, no handshake over plain TCP).
    pub fn write_all(&self, details: &mut Map<String, Value>, total: Duration) {
        for phase in Phase::ALL {
            let duration = self.get(phase).unwrap_or_default();
            details.insert(phase.key().to_string(), millis(duration).into());
        }
        details.insert(TOTAL_TIME_KEY.to_string(), millis(total).into());
    }
}
