use std::time::Duration;

use serde_json::{Map, Value, json};

use super::parse::{TraceHop, parse_destination, parse_traceroute};
use super::{DEFAULT_MAX_HOPS, DEFAULT_TIMEOUT_SECS, TracerouteOptions};
use crate::probe::command::{self, bounded, validate_host};
use crate::probe::expect::{Mismatches, check_reachable};
use crate::probe::timing::{PhaseTimer, millis};
use crate::probe::{ProbeError, ProbeResult, resolve_timeout, tool_name};

pub const DEFAULT_TOOL: &str = "network.traceroute";
const DEFAULT_QUERIES: u32 = 3;
const DEFAULT_WAIT_SECS: f64 = 2.0;
const RAW_OUTPUT_LIMIT: usize = 8192;

/// Traces the path to a host with the system `traceroute`.
pub async fn probe_traceroute(opts: TracerouteOptions) -> ProbeResult {
    let tool = tool_name(opts.tool.as_deref(), DEFAULT_TOOL);
    let timeout = resolve_timeout(opts.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    let target = opts.host.trim().to_string();
    let max_hops = if opts.max_hops == 0 { DEFAULT_MAX_HOPS } else { opts.max_hops.min(255) };
    let queries = if opts.queries == 0 { DEFAULT_QUERIES } else { opts.queries.min(10) };
    let wait = resolve_timeout(opts.wait_seconds, DEFAULT_WAIT_SECS);

    let timer = PhaseTimer::start();
    if let Err(err) = validate_host(&target) {
        return ProbeResult::rejected(tool, target, err);
    }

    let args = traceroute_args(&target, max_hops, queries, wait);
    let outcome = command::run("traceroute", &args, timeout).await;
    let total = timer.elapsed();

    let mut details = Map::new();
    details.insert("host".to_string(), target.clone().into());
    details.insert("max_hops".to_string(), max_hops.into());

    let trace = outcome.and_then(|output| {
        let hops = parse_traceroute(&output.stdout);
        if hops.is_empty() {
            return Err(ProbeError::transport(output.failure_reason("traceroute")));
        }
        // BSD traceroute prints its header on stderr.
        let destination = parse_destination(&output.stdout).or_else(|| parse_destination(&output.stderr));
        Ok((hops, destination, output.stdout))
    });

    match trace {
        Ok((hops, destination, stdout)) => {
            let reached = destination_reached(&hops, destination.as_deref().unwrap_or(&target));
            log::debug!("[{tool}] {target}: {} hops, reached={reached}", hops.len());

            details.insert("destination".to_string(), destination.into());
            details.insert("destination_reached".to_string(), reached.into());
            details.insert("total_hops".to_string(), hops.len().into());
            details.insert("hops".to_string(), hops_json(&hops));
            details.insert("raw_output".to_string(), bounded(&stdout, RAW_OUTPUT_LIMIT).into());
            timer.write_observed(&mut details, total);

            let mut mismatches = Mismatches::new();
            check_reachable(&mut mismatches, opts.expect_reachable, reached);
            ProbeResult::completed(tool, target, None, millis(total), details, mismatches.into_reason())
        }
        Err(err) => {
            log::debug!("[{tool}] {target}: {err}");
            timer.write_observed(&mut details, total);
            ProbeResult::failed(tool, target, err, millis(total), details)
        }
    }
}

fn traceroute_args(host: &str, max_hops: u32, queries: u32, wait: Duration) -> Vec<String> {
    vec![
        "-n".to_string(),
        "-m".to_string(),
        max_hops.to_string(),
        "-q".to_string(),
        queries.to_string(),
        "-w".to_string(),
        wait.as_secs().max(1).to_string(),
        host.to_string(),
    ]
}

fn destination_reached(hops: &[TraceHop], destination: &str) -> bool {
    hops.last()
        .and_then(|hop| hop.host.as_deref())
        .is_some_and(|host| host == destination)
}

fn hops_json(hops: &[TraceHop]) -> Value {
    Value::Array(
        hops.iter()
            .map(|hop| {
                json!({
                    "hop": hop.hop,
                    "host": hop.host,
                    "rtts_ms": hop.rtts_ms,
                    "lost": hop.lost,
                    "loss_percent": hop.loss_percent(),
                    "avg_ms": hop.avg_ms(),
                })
            })
            .collect(),
    )
}
