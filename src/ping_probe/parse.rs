//! Parsing of the system `ping` output (iputils on Linux, BSD ping on macOS,
//! and the English output of Windows ping).

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingReply {
    pub seq: u32,
    pub ttl: Option<u32>,
    pub time_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RttSummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub stddev_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingStats {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub rtt: Option<RttSummary>,
    pub replies: Vec<PingReply>,
}

impl PingStats {
    pub fn reachable(&self) -> bool {
        self.received > 0
    }
}

/// Returns `None` when the output has no statistics block, which means ping
/// never got as far as sending.
pub fn parse_ping_output(output: &str) -> Option<PingStats> {
    parse_unix_output(output).or_else(|| parse_windows_output(output))
}

fn parse_unix_output(output: &str) -> Option<PingStats> {
    let stats_line = output.lines().find(|l| l.contains("packets transmitted"))?;
    let (transmitted, received, loss_percent) = parse_stats_line(stats_line)?;

    let rtt = output
        .lines()
        .find(|l| l.contains("min/avg/max"))
        .and_then(parse_rtt_line);

    let replies = output.lines().filter_map(parse_reply_line).collect();

    Some(PingStats {
        transmitted,
        received,
        loss_percent,
        rtt,
        replies,
    })
}

/// `4 packets transmitted, 3 received, +1 errors, 25% packet loss, time 3004ms`
/// `4 packets transmitted, 4 packets received, 0.0% packet loss`
fn parse_stats_line(line: &str) -> Option<(u32, u32, f64)> {
    let mut transmitted = None;
    let mut received = None;
    let mut loss = None;

    for part in line.split(',').map(str::trim) {
        let leading = part.split_whitespace().next().unwrap_or_default();
        if part.contains("transmitted") {
            transmitted = leading.parse().ok();
        } else if part.contains("received") {
            received = leading.parse().ok();
        } else if part.contains("packet loss") {
            loss = leading.trim_end_matches('%').parse().ok();
        }
    }

    Some((transmitted?, received?, loss?))
}

/// `rtt min/avg/max/mdev = 0.030/0.040/0.050/0.010 ms`
fn parse_rtt_line(line: &str) -> Option<RttSummary> {
    let values = line.split('=').nth(1)?.split_whitespace().next()?;
    let parts: Vec<f64> = values
        .split('/')
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    if parts.len() < 3 {
        return None;
    }
    Some(RttSummary {
        min_ms: parts[0],
        avg_ms: parts[1],
        max_ms: parts[2],
        stddev_ms: parts.get(3).copied().unwrap_or(0.0),
    })
}

/// `64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms`
fn parse_reply_line(line: &str) -> Option<PingReply> {
    if !line.contains("bytes from") {
        return None;
    }
    let mut seq = None;
    let mut ttl = None;
    let mut time_ms = None;
    for token in line.split_whitespace() {
        if let Some(v) = token.strip_prefix("icmp_seq=") {
            seq = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("ttl=") {
            ttl = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("time=") {
            time_ms = v.trim_end_matches("ms").parse().ok();
        }
    }
    Some(PingReply {
        seq: seq?,
        ttl,
        time_ms: time_ms?,
    })
}

/// ```text
/// Reply from 1.1.1.1: bytes=32 time=12ms TTL=57
///     Packets: Sent = 4, Received = 3, Lost = 1 (25% loss),
///     Minimum = 11ms, Maximum = 13ms, Average = 12ms
/// ```
fn parse_windows_output(output: &str) -> Option<PingStats> {
    let stats_line = output.lines().find(|l| l.contains("Packets: Sent"))?;
    let mut transmitted = None;
    let mut received = None;
    for part in stats_line.split(',') {
        let value = part.split('=').nth(1).and_then(|v| v.split_whitespace().next());
        if part.contains("Sent") {
            transmitted = value.and_then(|v| v.parse::<u32>().ok());
        } else if part.contains("Received") {
            received = value.and_then(|v| v.parse::<u32>().ok());
        }
    }
    let loss_percent = stats_line
        .split('(')
        .nth(1)
        .and_then(|rest| rest.split('%').next())
        .and_then(|v| v.trim().parse::<f64>().ok())?;

    let rtt = output
        .lines()
        .find(|l| l.contains("Minimum ="))
        .and_then(parse_windows_rtt_line);

    let replies = output
        .lines()
        .filter(|l| l.trim_start().starts_with("Reply from"))
        .filter_map(parse_windows_reply_line)
        .enumerate()
        .map(|(seq, (ttl, time_ms))| PingReply {
            seq: seq as u32 + 1,
            ttl,
            time_ms,
        })
        .collect();

    Some(PingStats {
        transmitted: transmitted?,
        received: received?,
        loss_percent,
        rtt,
        replies,
    })
}

fn parse_windows_rtt_line(line: &str) -> Option<RttSummary> {
    let field = |name: &str| -> Option<f64> {
        line.split(',')
            .find(|part| part.contains(name))?
            .split('=')
            .nth(1)?
            .trim()
            .trim_end_matches("ms")
            .parse()
            .ok()
    };
    Some(RttSummary {
        min_ms: field("Minimum")?,
        avg_ms: field("Average")?,
        max_ms: field("Maximum")?,
        stddev_ms: 0.0,
    })
}

/// `time<1ms` is reported as 1ms. Lines without a time (`Destination host
/// unreachable`) are not replies.
fn parse_windows_reply_line(line: &str) -> Option<(Option<u32>, f64)> {
    let mut ttl = None;
    let mut time_ms = None;
    for token in line.split_whitespace() {
        if let Some(v) = token.strip_prefix("time=").or_else(|| token.strip_prefix("time<")) {
            time_ms = v.trim_end_matches("ms").parse().ok();
        } else if let Some(v) = token.strip_prefix("TTL=") {
            ttl = v.parse().ok();
        }
    }
    Some((ttl, time_ms?))
}
