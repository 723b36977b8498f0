//! Protocol-level network diagnostics.
//!
//! Each probe (HTTP, ping, traceroute, mtr, DNS) runs one bounded exchange
//! and reports it as a [`ProbeResult`](probe::ProbeResult): a success flag,
//! a latency, a bag of protocol details and a human-readable error.
//! The [`Gateway`](gateway::Gateway) routes named tool invocations to the
//! probes and applies the retry policy.

pub mod config;
pub mod dns_probe;
pub mod gateway;
pub mod http_probe;
pub mod ping_probe;
pub mod probe;
pub mod trace_probe;

pub mod prelude {
    pub use crate::config::{GatewayConfig, RetryPolicy, ToolConfig, load_config};
    pub use crate::dns_probe::{DnsOptions, DnsTransport, probe_dns};
    pub use crate::gateway::{Gateway, ProbeRequest};
    pub use crate::http_probe::{HttpOptions, probe_http};
    pub use crate::ping_probe::{PingOptions, probe_ping};
    pub use crate::probe::{FailureKind, ProbeError, ProbeKind, ProbeOptions, ProbeResult};
    pub use crate::trace_probe::{MtrOptions, TracerouteOptions, probe_mtr, probe_traceroute};
}
