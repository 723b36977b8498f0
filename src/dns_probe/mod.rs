pub mod probe;

use serde::{Deserialize, Serialize};

pub use probe::{DEFAULT_TIMEOUT_SECS, DEFAULT_TOOL, probe_dns, system_resolver};

/// Transport used to reach the nameservers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsTransport {
    #[default]
    Udp,
    Tcp,
}

/// Parameters for one DNS lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsOptions {
    pub tool: Option<String>,
    pub timeout_seconds: f64,

    /// Name to query. For PTR lookups an IP address is turned into its reverse name.
    #[serde(alias = "target", alias = "host")]
    pub name: String,

    /// A, AAAA, CNAME, MX, NS, PTR, SOA, SRV, TXT or CAA. Defaults to A.
    pub record_type: String,

    /// `ip` or `ip:port`. Empty means the system resolver configuration.
    pub nameservers: Vec<String>,

    pub protocol: DnsTransport,

    /// Whether the answer must contain at least one record.
    pub expect_resolves: Option<bool>,

    /// A value one of the returned records must carry, e.g. an address.
    pub expect_resolves_to: Option<String>,
}

impl Default for DnsOptions {
    fn default() -> Self {
        DnsOptions {
            tool: None,
            timeout_seconds: 0.0,
            name: String::new(),
            record_type: "A".to_string(),
            nameservers: Vec::new(),
            protocol: DnsTransport::Udp,
            expect_resolves: Some(true),
            expect_resolves_to: None,
        }
    }
}

impl DnsOptions {
    pub fn lookup(name: impl Into<String>, record_type: impl Into<String>) -> Self {
        DnsOptions {
            name: name.into(),
            record_type: record_type.into(),
            ..Default::default()
        }
    }
}
