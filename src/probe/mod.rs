pub mod command;
pub mod error;
pub mod expect;
pub mod result;
pub mod timing;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{ProbeError, report};
pub use result::{FailureKind, ProbeResult};

use crate::dns_probe::{self, DnsOptions};
use crate::http_probe::{self, HttpOptions};
use crate::ping_probe::{self, PingOptions};
use crate::trace_probe::{self, MtrOptions, TracerouteOptions};

/// The diagnostic capabilities the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Ping,
    Traceroute,
    Mtr,
    #[serde(rename = "nslookup", alias = "dns")]
    DnsLookup,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 5] = [
        ProbeKind::Http,
        ProbeKind::Ping,
        ProbeKind::Traceroute,
        ProbeKind::Mtr,
        ProbeKind::DnsLookup,
    ];

    /// The tool name reported when the caller does not override it.
    pub fn default_tool(&self) -> &'static str {
        match self {
            ProbeKind::Http => http_probe::DEFAULT_TOOL,
            ProbeKind::Ping => ping_probe::DEFAULT_TOOL,
            ProbeKind::Traceroute => trace_probe::TRACEROUTE_TOOL,
            ProbeKind::Mtr => trace_probe::MTR_TOOL,
            ProbeKind::DnsLookup => dns_probe::DEFAULT_TOOL,
        }
    }

    pub fn from_tool(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.default_tool() == name)
    }

    /// Decodes a caller's parameter object into this capability's options.
    pub fn options_from_value(&self, params: Value) -> Result<ProbeOptions, ProbeError> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let decoded = match self {
            ProbeKind::Http => serde_json::from_value(params).map(ProbeOptions::Http),
            ProbeKind::Ping => serde_json::from_value(params).map(ProbeOptions::Ping),
            ProbeKind::Traceroute => serde_json::from_value(params).map(ProbeOptions::Traceroute),
            ProbeKind::Mtr => serde_json::from_value(params).map(ProbeOptions::Mtr),
            ProbeKind::DnsLookup => serde_json::from_value(params).map(ProbeOptions::DnsLookup),
        };
        decoded.map_err(|e| ProbeError::build(format!("invalid parameters for {self}: {e}")))
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeKind::Http => "http",
            ProbeKind::Ping => "ping",
            ProbeKind::Traceroute => "traceroute",
            ProbeKind::Mtr => "mtr",
            ProbeKind::DnsLookup => "nslookup",
        };
        f.write_str(name)
    }
}

/// Caller-supplied configuration for exactly one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOptions {
    Http(HttpOptions),
    Ping(PingOptions),
    Traceroute(TracerouteOptions),
    Mtr(MtrOptions),
    DnsLookup(DnsOptions),
}

impl ProbeOptions {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeOptions::Http(_) => ProbeKind::Http,
            ProbeOptions::Ping(_) => ProbeKind::Ping,
            ProbeOptions::Traceroute(_) => ProbeKind::Traceroute,
            ProbeOptions::Mtr(_) => ProbeKind::Mtr,
            ProbeOptions::DnsLookup(_) => ProbeKind::DnsLookup,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ProbeOptions::Http(o) => &o.url,
            ProbeOptions::Ping(o) => &o.host,
            ProbeOptions::Traceroute(o) => &o.host,
            ProbeOptions::Mtr(o) => &o.host,
            ProbeOptions::DnsLookup(o) => &o.name,
        }
    }

    pub fn tool_mut(&mut self) -> &mut Option<String> {
        match self {
            ProbeOptions::Http(o) => &mut o.tool,
            ProbeOptions::Ping(o) => &mut o.tool,
            ProbeOptions::Traceroute(o) => &mut o.tool,
            ProbeOptions::Mtr(o) => &mut o.tool,
            ProbeOptions::DnsLookup(o) => &mut o.tool,
        }
    }

    /// Runs the probe. Never fails: every outcome is a [`ProbeResult`].
    ///
    /// The future owns all of its resources, so dropping it cancels the probe
    /// and kills any child process.
    pub async fn execute(self) -> ProbeResult {
        match self {
            ProbeOptions::Http(o) => http_probe::probe_http(o).await,
            ProbeOptions::Ping(o) => ping_probe::probe_ping(o).await,
            ProbeOptions::Traceroute(o) => trace_probe::probe_traceroute(o).await,
            ProbeOptions::Mtr(o) => trace_probe::probe_mtr(o).await,
            ProbeOptions::DnsLookup(o) => dns_probe::probe_dns(o).await,
        }
    }
}

/// `timeout_seconds` with the driver's default applied for unset or
/// non-positive values.
pub fn resolve_timeout(seconds: f64, default_secs: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::from_secs_f64(default_secs)
    }
}

pub fn tool_name(requested: Option<&str>, default: &str) -> String {
    match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default.to_string(),
    }
}
