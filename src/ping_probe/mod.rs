pub mod parse;
pub mod probe;

use serde::{Deserialize, Serialize};

pub use probe::{DEFAULT_COUNT, DEFAULT_TIMEOUT_SECS, DEFAULT_TOOL, probe_ping};

/// Parameters for one ping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingOptions {
    pub tool: Option<String>,

    /// Bound on the whole run. Values <= 0 fall back to 20 seconds.
    pub timeout_seconds: f64,

    #[serde(alias = "target")]
    pub host: String,

    /// Echo requests to send. 0 means 4.
    pub count: u32,

    /// How long to wait for each reply. Values <= 0 fall back to 2 seconds.
    pub wait_seconds: f64,

    /// Defaults to expecting the host to answer.
    pub expect_reachable: Option<bool>,

    pub expect_max_loss_percent: Option<f64>,
}

impl Default for PingOptions {
    fn default() -> Self {
        PingOptions {
            tool: None,
            timeout_seconds: 0.0,
            host: String::new(),
            count: 0,
            wait_seconds: 0.0,
            expect_reachable: Some(true),
            expect_max_loss_percent: None,
        }
    }
}

impl PingOptions {
    pub fn host(host: impl Into<String>) -> Self {
        PingOptions {
            host: host.into(),
            ..Default::default()
        }
    }
}
