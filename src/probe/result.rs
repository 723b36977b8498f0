use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ProbeError;

/// Which branch of the error taxonomy a failed probe ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Construction,
    Transport,
    Expectation,
}

/// The envelope every probe returns, whatever the protocol.
///
/// `success` is true exactly when `error` is empty. Both constructors keep
/// that invariant, so build results through them rather than by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub tool: String,
    pub target: String,
    pub status_code: Option<u16>,
    pub latency_ms: f64,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub error: String,

    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl ProbeResult {
    /// A probe whose exchange completed. `mismatch` is the expectation
    /// evaluator's verdict: `None` means every declared expectation held.
    pub fn completed(
        tool: impl Into<String>,
        target: impl Into<String>,
        status_code: Option<u16>,
        latency_ms: f64,
        details: Map<String, Value>,
        mismatch: Option<String>,
    ) -> Self {
        let (success, error, failure) = match mismatch {
            Some(reason) if !reason.is_empty() => (false, reason, Some(FailureKind::Expectation)),
            _ => (true, String::new(), None),
        };
        ProbeResult {
            success,
            tool: tool.into(),
            target: target.into(),
            status_code,
            latency_ms,
            details,
            error,
            failure,
        }
    }

    /// A probe that stopped at construction or transport time.
    pub fn failed(
        tool: impl Into<String>,
        target: impl Into<String>,
        err: ProbeError,
        latency_ms: f64,
        details: Map<String, Value>,
    ) -> Self {
        ProbeResult {
            success: false,
            tool: tool.into(),
            target: target.into(),
            status_code: None,
            latency_ms,
            details,
            error: err.to_string(),
            failure: Some(err.kind()),
        }
    }

    /// Construction failure: nothing ran, so there is nothing to time.
    pub fn rejected(tool: impl Into<String>, target: impl Into<String>, err: ProbeError) -> Self {
        Self::failed(tool, target, err, 0.0, Map::new())
    }

    /// Whether running the same probe again could plausibly change the verdict.
    pub fn is_transport_failure(&self) -> bool {
        self.failure == Some(FailureKind::Transport)
    }

    pub fn is_expectation_mismatch(&self) -> bool {
        self.failure == Some(FailureKind::Expectation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completed_without_mismatch_is_success() {
        let result = ProbeResult::completed("network.http", "http://a", Some(200), 12.0, Map::new(), None);
        assert!(result.success);
        assert_eq!(result.error, "");
        assert_eq!(result.failure, None);
    }

    #[test]
    fn test_completed_with_mismatch_keeps_status() {
        let result = ProbeResult::completed(
            "network.http",
            "http://a",
            Some(200),
            12.0,
            Map::new(),
            Some("expect status 404, got 200".to_string()),
        );
        assert!(!result.success);
        assert_eq!(result.status_code, Some(200));
        assert!(result.is_expectation_mismatch());
        assert!(!result.is_transport_failure());
    }

    #[test]
    fn test_failed_has_no_status_and_prefixed_error() {
        let result = ProbeResult::failed(
            "network.http",
            "http://a",
            ProbeError::transport("dns error"),
            3.0,
            Map::new(),
        );
        assert!(!result.success);
        assert_eq!(result.status_code, None);
        assert!(result.error.starts_with("request failed:"));
        assert!(result.is_transport_failure());
    }

    #[test]
    fn test_wire_shape() {
        let mut details = Map::new();
        details.insert("body_snippet".to_string(), json!("hello"));
        let result = ProbeResult::completed("network.http", "http://a/ok", Some(200), 5.0, details, None);

        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(
            value,
            json!({
                "success": true,
                "tool": "network.http",
                "target": "http://a/ok",
                "status_code": 200,
                "latency_ms": 5.0,
                "details": {"body_snippet": "hello"},
                "error": "",
            })
        );
    }
}
