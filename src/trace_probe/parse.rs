//! Parsing of `traceroute -n` output and `mtr -r -n` reports.

use serde::Serialize;

/// One hop of a traceroute run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceHop {
    pub hop: u32,
    pub host: Option<String>,
    pub rtts_ms: Vec<f64>,
    pub lost: u32,
}

impl TraceHop {
    pub fn loss_percent(&self) -> f64 {
        let sent = self.rtts_ms.len() as u32 + self.lost;
        if sent == 0 {
            return 0.0;
        }
        f64::from(self.lost) * 100.0 / f64::from(sent)
    }

    pub fn avg_ms(&self) -> Option<f64> {
        if self.rtts_ms.is_empty() {
            return None;
        }
        Some(self.rtts_ms.iter().sum::<f64>() / self.rtts_ms.len() as f64)
    }
}

/// The address in the `traceroute to host (addr), ...` header.
pub fn parse_destination(output: &str) -> Option<String> {
    let header = output.lines().find(|l| l.starts_with("traceroute to "))?;
    let start = header.find('(')? + 1;
    let end = header[start..].find(')')? + start;
    Some(header[start..end].to_string())
}

/// Hop lines look like
/// ` 3  10.0.0.1  1.203 ms * 10.0.0.9  1.411 ms`
/// where `*` is an unanswered probe and `!H`-style flags annotate the previous reply.
pub fn parse_traceroute(output: &str) -> Vec<TraceHop> {
    output.lines().filter_map(parse_hop_line).collect()
}

fn parse_hop_line(line: &str) -> Option<TraceHop> {
    let mut tokens = line.split_whitespace().peekable();
    let hop: u32 = tokens.next()?.parse().ok()?;

    let mut host = None;
    let mut rtts_ms = Vec::new();
    let mut lost = 0;

    while let Some(token) = tokens.next() {
        if token == "*" {
            lost += 1;
        } else if token == "ms" || token.starts_with('!') {
            continue;
        } else if let Ok(rtt) = token.parse::<f64>() {
            if tokens.peek() == Some(&"ms") {
                rtts_ms.push(rtt);
            }
        } else if host.is_none() {
            host = Some(token.trim_matches(|c| c == '(' || c == ')').to_string());
        }
    }

    Some(TraceHop {
        hop,
        host,
        rtts_ms,
        lost,
    })
}

/// One row of an mtr report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MtrHop {
    pub hop: u32,
    pub host: String,
    pub loss_percent: f64,
    pub sent: u32,
    pub last_ms: f64,
    pub avg_ms: f64,
    pub best_ms: f64,
    pub worst_ms: f64,
    pub stddev_ms: f64,
}

impl MtrHop {
    pub fn answered(&self) -> bool {
        self.host != "???" && self.loss_percent < 100.0
    }
}

/// Rows look like `  1.|-- 192.168.1.1   0.0%    10    0.5   0.6   0.5   0.8   0.1`.
pub fn parse_mtr_report(output: &str) -> Vec<MtrHop> {
    output.lines().filter_map(parse_mtr_line).collect()
}

fn parse_mtr_line(line: &str) -> Option<MtrHop> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return None;
    }
    let hop = tokens[0]
        .trim_end_matches("|--")
        .trim_end_matches("`--")
        .trim_end_matches('.')
        .parse()
        .ok()?;
    let number = |i: usize| tokens[i].trim_end_matches('%').parse::<f64>().ok();

    Some(MtrHop {
        hop,
        host: tokens[1].to_string(),
        loss_percent: number(2)?,
        sent: tokens[3].parse().ok()?,
        last_ms: number(4)?,
        avg_ms: number(5)?,
        best_ms: number(6)?,
        worst_ms: number(7)?,
        stddev_ms: number(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACEROUTE: &str = "\
traceroute to example.com (93.184.216.34), 30 hops max, 60 byte packets
 1  192.168.1.1  0.412 ms  0.389 ms  0.377 ms
 2  * * *
 3  10.0.0.1  1.203 ms * 10.0.0.9  1.411 ms
 4  93.184.216.34  11.020 ms !H  11.310 ms  10.990 ms
";

    const MTR: &str = "\
Start: 2024-05-01T10:00:00+0000
HOST: probe-host                  Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- 192.168.1.1                0.0%    10    0.5   0.6   0.5   0.8   0.1
  2.|-- ???                       100.0    10    0.0   0.0   0.0   0.0   0.0
  3.|-- 93.184.216.34             10.0%    10   11.2  11.4  10.9  12.3   0.4
";

    #[test]
    fn test_destination_header() {
        assert_eq!(parse_destination(TRACEROUTE).as_deref(), Some("93.184.216.34"));
        assert_eq!(parse_destination("no header"), None);
    }

    #[test]
    fn test_traceroute_hops() {
        let hops = parse_traceroute(TRACEROUTE);
        assert_eq!(hops.len(), 4);

        assert_eq!(hops[0].host.as_deref(), Some("192.168.1.1"));
        assert_eq!(hops[0].rtts_ms, vec![0.412, 0.389, 0.377]);
        assert_eq!(hops[0].loss_percent(), 0.0);

        assert_eq!(hops[1].host, None);
        assert_eq!(hops[1].lost, 3);
        assert_eq!(hops[1].loss_percent(), 100.0);
        assert_eq!(hops[1].avg_ms(), None);

        assert_eq!(hops[2].host.as_deref(), Some("10.0.0.1"));
        assert_eq!(hops[2].rtts_ms, vec![1.203, 1.411]);
        assert_eq!(hops[2].lost, 1);

        assert_eq!(hops[3].host.as_deref(), Some("93.184.216.34"));
        assert_eq!(hops[3].rtts_ms.len(), 3);
    }

    #[test]
    fn test_header_is_not_a_hop() {
        assert!(parse_traceroute("traceroute to a (1.2.3.4), 30 hops max\n").is_empty());
    }

    #[test]
    fn test_mtr_report() {
        let hops = parse_mtr_report(MTR);
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[0].hop, 1);
        assert_eq!(hops[0].host, "192.168.1.1");
        assert!(hops[0].answered());
        assert!(!hops[1].answered());
        assert_eq!(hops[2].loss_percent, 10.0);
        assert_eq!(hops[2].avg_ms, 11.4);
        assert_eq!(hops[2].sent, 10);
    }
}
