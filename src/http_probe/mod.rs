pub mod probe;
pub mod result;
pub mod tls;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use probe::{BODY_SNIPPET_LIMIT, DEFAULT_TIMEOUT_SECS, DEFAULT_TOOL, MAX_REDIRECTS, probe_http};

/// Parameters for one HTTP probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Overrides the reported tool name. Defaults to `network.http`.
    pub tool: Option<String>,

    /// Whole-probe timeout. Values <= 0 fall back to 15 seconds.
    pub timeout_seconds: f64,

    /// Request method, upper-cased. Empty means GET.
    pub method: String,

    pub url: String,

    /// Set on the request after the defaults, replacing any default with the same name.
    pub headers: BTreeMap<String, String>,

    /// Sent only when non-empty.
    pub body: Option<String>,

    /// Status the response must carry. 0 counts as unset.
    pub expect_status: Option<u16>,

    /// Substring the first 4096 body bytes must contain. Empty counts as unset.
    pub expect_contains: Option<String>,

    /// Accept any server certificate, as a blackbox prober of internal endpoints usually must.
    pub insecure_skip_verify: bool,
}

impl HttpOptions {
    pub fn get(url: impl Into<String>) -> Self {
        HttpOptions {
            url: url.into(),
            ..Default::default()
        }
    }

    pub(crate) fn expected_status(&self) -> Option<u16> {
        self.expect_status.filter(|status| *status != 0)
    }

    pub(crate) fn expected_substring(&self) -> Option<&str> {
        self.expect_contains.as_deref().filter(|s| !s.is_empty())
    }
}
