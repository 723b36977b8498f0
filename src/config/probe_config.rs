use serde::Deserialize;
use serde_json::{Map, Value};

use crate::probe::{ProbeKind, ProbeResult};

/// Gateway configuration for the netprobe service.
/// Contains the tool registry, the retry policy and the default DNS servers.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Tool names the gateway accepts and the probe each one runs.
    /// Defaults to the five built-in `network.*` tools.
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolConfig>,

    /// Retry policy applied to every invocation.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Nameservers used by DNS lookups that do not name their own.
    #[serde(default)]
    pub dns_hosts: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            tools: default_tools(),
            retry: RetryPolicy::default(),
            dns_hosts: Vec::new(),
        }
    }
}

/// A registered tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// The logical tool name callers invoke, e.g. `network.http`.
    pub name: String,

    /// Which probe runs for this name.
    pub kind: ProbeKind,

    /// Parameters merged beneath the caller's, e.g. a default ping count.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

/// How often a failed probe is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. Defaults to 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts in milliseconds. Defaults to 0.
    #[serde(default)]
    pub delay_ms: u64,

    /// Also retry when the exchange completed but an expectation failed.
    /// Off by default: the same target usually answers the same way.
    #[serde(default)]
    pub retry_on_mismatch: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: default_max_retries(),
            delay_ms: 0,
            retry_on_mismatch: false,
        }
    }
}

impl RetryPolicy {
    /// Construction failures are never retried.
    pub fn should_retry(&self, result: &ProbeResult) -> bool {
        result.is_transport_failure() || (self.retry_on_mismatch && result.is_expectation_mismatch())
    }
}

fn default_tools() -> Vec<ToolConfig> {
    ProbeKind::ALL
        .into_iter()
        .map(|kind| ToolConfig {
            name: kind.default_tool().to_string(),
            kind,
            defaults: Map::new(),
        })
        .collect()
}

fn default_max_retries() -> u32 {
    1
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::probe::ProbeError;

    #[test]
    fn test_default_tools() {
        let names: Vec<String> = default_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "network.http",
                "network.ping",
                "network.traceroute",
                "network.mtr",
                "network.nslookup"
            ]
        );
    }

    #[test]
    fn test_gateway_config_deserialization() {
        let yaml = r#"
                    retry:
                        max_retries: 2
                        delay_ms: 250
                    dns_hosts: [1.1.1.1, 8.8.8.8]
                    tools:
                        - name: network.http
                          kind: http
                        - name: network.ping
                          kind: ping
                          defaults:
                              count: 2
                        - name: network.dig
                          kind: dns
                                    "#;

        let config: GatewayConfig = serde_yaml::from_str(yaml).expect("Invalid YAML");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.delay_ms, 250);
        assert!(!config.retry.retry_on_mismatch);
        assert_eq!(config.dns_hosts, vec!["1.1.1.1", "8.8.8.8"]);
        assert_eq!(config.tools.len(), 3);
        assert_eq!(config.tools[1].kind, ProbeKind::Ping);
        assert_eq!(config.tools[1].defaults["count"], 2);
        assert_eq!(config.tools[2].name, "network.dig");
        assert_eq!(config.tools[2].kind, ProbeKind::DnsLookup);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: GatewayConfig = serde_yaml::from_str("{}").expect("Invalid YAML");
        assert_eq!(config.tools.len(), ProbeKind::ALL.len());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        let transport = ProbeResult::rejected("t", "x", ProbeError::transport("refused"));
        let build = ProbeResult::rejected("t", "x", ProbeError::build("bad url"));
        let mismatch = ProbeResult::completed("t", "x", Some(200), 1.0, Map::new(), Some("expect status 404, got 200".into()));

        assert!(policy.should_retry(&transport));
        assert!(!policy.should_retry(&build));
        assert!(!policy.should_retry(&mismatch));

        let eager = RetryPolicy {
            retry_on_mismatch: true,
            ..policy
        };
        assert!(eager.should_retry(&mismatch));
    }
}
