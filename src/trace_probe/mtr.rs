use serde_json::{Map, json};

use super::parse::{MtrHop, parse_mtr_report};
use super::{DEFAULT_MAX_HOPS, DEFAULT_TIMEOUT_SECS, MtrOptions};
use crate::probe::command::{self, bounded, validate_host};
use crate::probe::expect::{Mismatches, check_max_loss, check_reachable};
use crate::probe::timing::{PhaseTimer, millis};
use crate::probe::{ProbeError, ProbeResult, resolve_timeout, tool_name};

pub const DEFAULT_TOOL: &str = "network.mtr";
const DEFAULT_REPORT_CYCLES: u32 = 10;
const RAW_OUTPUT_LIMIT: usize = 8192;

/// Measures per-hop loss and latency with an `mtr` report.
pub async fn probe_mtr(opts: MtrOptions) -> ProbeResult {
    let tool = tool_name(opts.tool.as_deref(), DEFAULT_TOOL);
    let timeout = resolve_timeout(opts.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    let target = opts.host.trim().to_string();
    let cycles = if opts.report_cycles == 0 { DEFAULT_REPORT_CYCLES } else { opts.report_cycles };
    let max_hops = if opts.max_hops == 0 { DEFAULT_MAX_HOPS } else { opts.max_hops.min(255) };

    let timer = PhaseTimer::start();
    if let Err(err) = validate_host(&target) {
        return ProbeResult::rejected(tool, target, err);
    }

    let args = mtr_args(&target, cycles, max_hops);
    let outcome = command::run("mtr", &args, timeout).await;
    let total = timer.elapsed();

    let mut details = Map::new();
    details.insert("host".to_string(), target.clone().into());
    details.insert("report_cycles".to_string(), cycles.into());
    details.insert("max_hops".to_string(), max_hops.into());

    let report = outcome.and_then(|output| {
        let hops = parse_mtr_report(&output.stdout);
        if hops.is_empty() {
            return Err(ProbeError::transport(output.failure_reason("mtr")));
        }
        Ok((hops, output.stdout))
    });

    match report {
        Ok((hops, stdout)) => {
            let last = hops.last();
            let reached = last.is_some_and(MtrHop::answered);
            let final_loss = last.map_or(100.0, |hop| hop.loss_percent);
            log::debug!("[{tool}] {target}: {} hops, final loss {final_loss}%", hops.len());

            details.insert("destination_reached".to_string(), reached.into());
            details.insert("final_hop_loss_percent".to_string(), final_loss.into());
            details.insert("total_hops".to_string(), hops.len().into());
            details.insert("hops".to_string(), json!(hops));
            details.insert("raw_output".to_string(), bounded(&stdout, RAW_OUTPUT_LIMIT).into());
            timer.write_observed(&mut details, total);

            let mut mismatches = Mismatches::new();
            check_reachable(&mut mismatches, opts.expect_reachable, reached);
            check_max_loss(&mut mismatches, opts.expect_max_loss_percent, final_loss);
            ProbeResult::completed(tool, target, None, millis(total), details, mismatches.into_reason())
        }
        Err(err) => {
            log::debug!("[{tool}] {target}: {err}");
            timer.write_observed(&mut details, total);
            ProbeResult::failed(tool, target, err, millis(total), details)
        }
    }
}

fn mtr_args(host: &str, cycles: u32, max_hops: u32) -> Vec<String> {
    vec![
        "-r".to_string(),
        "-n".to_string(),
        "-c".to_string(),
        cycles.to_string(),
        "-m".to_string(),
        max_hops.to_string(),
        host.to_string(),
    ]
}
