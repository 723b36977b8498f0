pub mod mtr;
pub mod parse;
pub mod traceroute;

use serde::{Deserialize, Serialize};

pub use mtr::{DEFAULT_TOOL as MTR_TOOL, probe_mtr};
pub use traceroute::{DEFAULT_TOOL as TRACEROUTE_TOOL, probe_traceroute};

/// Path tracing can take a while: every silent hop costs a full wait.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
pub const DEFAULT_MAX_HOPS: u32 = 30;

/// Parameters for one `traceroute` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteOptions {
    pub tool: Option<String>,
    pub timeout_seconds: f64,

    #[serde(alias = "target")]
    pub host: String,

    /// 0 means 30.
    pub max_hops: u32,

    /// Probes sent per hop. 0 means 3.
    pub queries: u32,

    /// Per-probe wait. Values <= 0 fall back to 2 seconds.
    pub wait_seconds: f64,

    /// Whether the last hop must be the destination. Unset by default since
    /// many destinations drop the probes even when they are up.
    pub expect_reachable: Option<bool>,
}

impl TracerouteOptions {
    pub fn host(host: impl Into<String>) -> Self {
        TracerouteOptions {
            host: host.into(),
            ..Default::default()
        }
    }
}

/// Parameters for one `mtr` report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtrOptions {
    pub tool: Option<String>,
    pub timeout_seconds: f64,

    #[serde(alias = "target")]
    pub host: String,

    /// Pings sent to every hop. 0 means 10.
    #[serde(alias = "count")]
    pub report_cycles: u32,

    /// 0 means 30.
    pub max_hops: u32,

    pub expect_reachable: Option<bool>,

    /// Loss ceiling at the final hop.
    pub expect_max_loss_percent: Option<f64>,
}

impl MtrOptions {
    pub fn host(host: impl Into<String>) -> Self {
        MtrOptions {
            host: host.into(),
            ..Default::default()
        }
    }
}
