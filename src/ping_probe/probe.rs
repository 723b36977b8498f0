use std::time::Duration;

use serde_json::{Map, Value, json};

use super::PingOptions;
use super::parse::{PingStats, parse_ping_output};
use crate::probe::command::{self, CommandOutput, bounded, validate_host};
use crate::probe::expect::{Mismatches, check_max_loss, check_reachable};
use crate::probe::timing::{PhaseTimer, millis};
use crate::probe::{ProbeError, ProbeResult, resolve_timeout, tool_name};

pub const DEFAULT_TOOL: &str = "network.ping";
pub const DEFAULT_TIMEOUT_SECS: f64 = 20.0;
pub const DEFAULT_COUNT: u32 = 4;
const DEFAULT_WAIT_SECS: f64 = 2.0;
const RAW_OUTPUT_LIMIT: usize = 4096;

/// Sends ICMP echo requests through the system `ping` and reports loss and
/// round-trip statistics.
pub async fn probe_ping(opts: PingOptions) -> ProbeResult {
    let tool = tool_name(opts.tool.as_deref(), DEFAULT_TOOL);
    let timeout = resolve_timeout(opts.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    let target = opts.host.trim().to_string();
    let count = if opts.count == 0 { DEFAULT_COUNT } else { opts.count };
    let wait = resolve_timeout(opts.wait_seconds, DEFAULT_WAIT_SECS);

    let timer = PhaseTimer::start();
    if let Err(err) = validate_host(&target) {
        return ProbeResult::rejected(tool, target, err);
    }

    let outcome = command::run("ping", &ping_args(&target, count, wait), timeout).await;
    let total = timer.elapsed();

    let mut details = Map::new();
    details.insert("host".to_string(), target.clone().into());
    details.insert("count".to_string(), count.into());

    let stats = outcome.and_then(|output| {
        let stats = parse_ping_output(&output.stdout)
            .ok_or_else(|| ProbeError::transport(output.failure_reason("ping")))?;
        Ok((stats, output))
    });

    match stats {
        Ok((stats, output)) => {
            log::debug!(
                "[{tool}] {target}: {}/{} received, {}% loss",
                stats.received,
                stats.transmitted,
                stats.loss_percent
            );
            write_stats(&mut details, &stats, &output);
            timer.write_observed(&mut details, total);

            let mut mismatches = Mismatches::new();
            check_reachable(&mut mismatches, opts.expect_reachable, stats.reachable());
            check_max_loss(&mut mismatches, opts.expect_max_loss_percent, stats.loss_percent);

            ProbeResult::completed(tool, target, None, millis(total), details, mismatches.into_reason())
        }
        Err(err) => {
            log::debug!("[{tool}] {target}: {err}");
            timer.write_observed(&mut details, total);
            ProbeResult::failed(tool, target, err, millis(total), details)
        }
    }
}

fn ping_args(host: &str, count: u32, wait: Duration) -> Vec<String> {
    if cfg!(windows) {
        windows_ping_args(host, count, wait)
    } else {
        unix_ping_args(host, count, wait)
    }
}

/// iputils takes the per-reply wait in seconds, BSD ping in milliseconds.
fn unix_ping_args(host: &str, count: u32, wait: Duration) -> Vec<String> {
    let wait = if cfg!(target_os = "macos") {
        wait.as_millis().max(1).to_string()
    } else {
        wait.as_secs().max(1).to_string()
    };
    vec![
        "-n".to_string(),
        "-c".to_string(),
        count.to_string(),
        "-W".to_string(),
        wait,
        host.to_string(),
    ]
}

/// Windows ping counts with `-n` and waits with `-w`, in milliseconds.
fn windows_ping_args(host: &str, count: u32, wait: Duration) -> Vec<String> {
    vec![
        "-n".to_string(),
        count.to_string(),
        "-w".to_string(),
        wait.as_millis().max(1).to_string(),
        host.to_string(),
    ]
}

fn write_stats(details: &mut Map<String, Value>, stats: &PingStats, output: &CommandOutput) {
    details.insert("packets_transmitted".to_string(), stats.transmitted.into());
    details.insert("packets_received".to_string(), stats.received.into());
    details.insert("packet_loss_percent".to_string(), stats.loss_percent.into());
    details.insert("reachable".to_string(), stats.reachable().into());
    if let Some(rtt) = stats.rtt {
        details.insert("rtt_min_ms".to_string(), rtt.min_ms.into());
        details.insert("rtt_avg_ms".to_string(), rtt.avg_ms.into());
        details.insert("rtt_max_ms".to_string(), rtt.max_ms.into());
        details.insert("rtt_stddev_ms".to_string(), rtt.stddev_ms.into());
    }
    details.insert("replies".to_string(), json!(stats.replies));
    details.insert("exit_code".to_string(), output.exit_code.into());
    details.insert("raw_output".to_string(), bounded(&output.stdout, RAW_OUTPUT_LIMIT).into());
}
