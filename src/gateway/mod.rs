use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigError, GatewayConfig, RetryPolicy};
use crate::probe::{ProbeError, ProbeKind, ProbeOptions, ProbeResult};

/// One tool invocation as it arrives from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub tool: String,
    #[serde(default, alias = "arguments")]
    pub params: Value,
}

impl ProbeRequest {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        ProbeRequest {
            tool: tool.into(),
            params,
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredTool {
    kind: ProbeKind,
    defaults: Map<String, Value>,
}

/// Routes tool names to probes and applies the retry policy.
#[derive(Debug, Clone)]
pub struct Gateway {
    tools: BTreeMap<String, RegisteredTool>,
    retry: RetryPolicy,
    dns_hosts: Vec<String>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let mut tools = BTreeMap::new();
        for tool in &config.tools {
            let registered = RegisteredTool {
                kind: tool.kind,
                defaults: tool.defaults.clone(),
            };
            if tools.insert(tool.name.clone(), registered).is_some() {
                return Err(ConfigError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(Gateway {
            tools,
            retry: config.retry,
            dns_hosts: config.dns_hosts.clone(),
        })
    }

    /// The five built-in tools, default retry policy, system DNS.
    pub fn with_defaults() -> Self {
        Gateway::new(&GatewayConfig::default()).expect("built-in tool names are unique")
    }

    /// Registered tool names with the probe each one runs, sorted by name.
    pub fn tools(&self) -> Vec<(&str, ProbeKind)> {
        self.tools.iter().map(|(name, tool)| (name.as_str(), tool.kind)).collect()
    }

    /// Resolves a request into the options of exactly one probe.
    ///
    /// Registered defaults sit beneath the caller's parameters. DNS lookups
    /// without nameservers get the configured `dns_hosts`, and the reported
    /// tool name is the name the caller invoked unless the parameters set one.
    pub fn prepare(&self, request: &ProbeRequest) -> Result<ProbeOptions, ProbeError> {
        let tool = self
            .tools
            .get(&request.tool)
            .ok_or_else(|| ProbeError::build(format!("unknown tool '{}'", request.tool)))?;

        let mut params = tool.defaults.clone();
        match &request.params {
            Value::Null => {}
            Value::Object(given) => {
                for (key, value) in given {
                    params.insert(key.clone(), value.clone());
                }
            }
            other => {
                return Err(ProbeError::build(format!(
                    "parameters for {} must be an object, got {other}",
                    request.tool
                )));
            }
        }

        let mut options = tool.kind.options_from_value(Value::Object(params))?;
        if let ProbeOptions::DnsLookup(dns) = &mut options {
            if dns.nameservers.is_empty() {
                dns.nameservers = self.dns_hosts.clone();
            }
        }
        let reported = options.tool_mut();
        if reported.is_none() {
            *reported = Some(request.tool.clone());
        }
        Ok(options)
    }

    /// Runs the request, retrying according to the policy.
    /// Always produces a result: unknown tools and bad parameters are
    /// construction failures.
    pub async fn invoke(&self, request: ProbeRequest) -> ProbeResult {
        let options = match self.prepare(&request) {
            Ok(options) => options,
            Err(err) => {
                log::warn!("[{}] rejected: {err}", request.tool);
                return ProbeResult::rejected(request.tool.clone(), request_target(&request.params), err);
            }
        };

        log::debug!("[{}] {} {}", request.tool, options.kind(), options.target());
        let mut attempt = 0;
        loop {
            let result = options.clone().execute().await;
            if attempt >= self.retry.max_retries || !self.retry.should_retry(&result) {
                if result.success {
                    log::info!("[{}] {} ok in {:.0}ms", result.tool, result.target, result.latency_ms);
                } else {
                    log::info!("[{}] {} failed: {}", result.tool, result.target, result.error);
                }
                return result;
            }
            attempt += 1;
            log::warn!(
                "[{}] {} failed: {}. Retrying ({attempt}/{})",
                result.tool,
                result.target,
                result.error,
                self.retry.max_retries
            );
            if self.retry.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.retry.delay_ms)).await;
            }
        }
    }
}

/// Best-effort target for requests that never became a probe.
fn request_target(params: &Value) -> String {
    ["url", "host", "name", "target"]
        .iter()
        .find_map(|key| params.get(key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}
