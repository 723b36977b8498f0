use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value, json};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::lookup::Lookup;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::{Name, RecordType};

use super::{DnsOptions, DnsTransport};
use crate::probe::expect::Mismatches;
use crate::probe::timing::{Phase, PhaseTimer, millis};
use crate::probe::{ProbeError, ProbeResult, resolve_timeout, tool_name};

pub const DEFAULT_TOOL: &str = "network.nslookup";
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

const SUPPORTED_RECORD_TYPES: [RecordType; 10] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::NS,
    RecordType::PTR,
    RecordType::SOA,
    RecordType::SRV,
    RecordType::TXT,
];

/// A resolver built from the host's resolver configuration, for callers that
/// only need addresses. Falls back to the library's public defaults when the
/// system configuration cannot be read.
pub fn system_resolver() -> TokioAsyncResolver {
    match trust_dns_resolver::system_conf::read_system_conf() {
        Ok((config, opts)) => TokioAsyncResolver::tokio(config, opts),
        Err(e) => {
            log::warn!("Cannot read system resolver configuration ({e}), using public resolvers");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        }
    }
}

/// Resolves one name and reports the answer as a [`ProbeResult`].
///
/// `status_code` carries the DNS response code (0 for NOERROR, 3 for NXDOMAIN).
/// An answer without records is a completed exchange, judged by the
/// `expect_resolves` expectation rather than reported as a transport failure.
pub async fn probe_dns(opts: DnsOptions) -> ProbeResult {
    let tool = tool_name(opts.tool.as_deref(), DEFAULT_TOOL);
    let timeout = resolve_timeout(opts.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    let target = opts.name.clone();

    let mut timer = PhaseTimer::start();
    let query = match Query::build(&opts, timeout) {
        Ok(query) => query,
        Err(err) => {
            log::debug!("[{tool}] {target}: {err}");
            return ProbeResult::rejected(tool, target, err);
        }
    };

    let outcome = tokio::time::timeout(
        timeout,
        timer.time(Phase::DnsLookup, query.resolver.lookup(query.name.clone(), query.record_type)),
    )
    .await;
    let total = timer.elapsed();

    let mut details = query.describe();
    timer.write_observed(&mut details, total);

    let answer = match outcome {
        Ok(Ok(lookup)) => Answer::from_lookup(&lookup),
        Ok(Err(e)) => match Answer::from_error(&e) {
            Some(answer) => answer,
            None => {
                let err = lookup_error(&target, &e, timeout);
                log::debug!("[{tool}] {target}: {err}");
                return ProbeResult::failed(tool, target, err, millis(total), details);
            }
        },
        Err(_) => {
            let err = ProbeError::timed_out(&format!("lookup {target}"), timeout.as_secs_f64());
            return ProbeResult::failed(tool, target, err, millis(total), details);
        }
    };

    log::debug!(
        "[{tool}] {target} {}: {:?}, {} records",
        query.record_type,
        answer.response_code,
        answer.records.len()
    );

    let mismatch = answer.evaluate(&opts);
    let status = u16::from(answer.response_code);
    answer.write_details(&mut details);
    ProbeResult::completed(tool, target, Some(status), millis(total), details, mismatch)
}

struct Query {
    resolver: TokioAsyncResolver,
    name: Name,
    record_type: RecordType,
    nameservers: Vec<String>,
    protocol: DnsTransport,
}

impl Query {
    fn build(opts: &DnsOptions, timeout: Duration) -> Result<Self, ProbeError> {
        let raw_name = opts.name.trim();
        if raw_name.is_empty() {
            return Err(ProbeError::build("name is required"));
        }

        let record_type = parse_record_type(&opts.record_type)?;
        let name = match raw_name.parse::<IpAddr>() {
            Ok(ip) if record_type == RecordType::PTR => Name::from(ip),
            _ => Name::from_ascii(raw_name)
                .map_err(|e| ProbeError::build(format!("invalid name '{raw_name}': {e}")))?,
        };

        let mut resolver_opts = ResolverOpts::default();
        let (config, nameservers) = if opts.nameservers.is_empty() {
            match trust_dns_resolver::system_conf::read_system_conf() {
                Ok((config, system_opts)) => {
                    resolver_opts = system_opts;
                    (config, vec!["system".to_string()])
                }
                Err(e) => {
                    log::warn!("Cannot read system resolver configuration ({e}), using public resolvers");
                    (ResolverConfig::default(), vec!["default".to_string()])
                }
            }
        } else {
            let mut group = NameServerConfigGroup::new();
            for server in &opts.nameservers {
                group.push(NameServerConfig {
                    socket_addr: parse_nameserver(server)?,
                    protocol: match opts.protocol {
                        DnsTransport::Udp => Protocol::Udp,
                        DnsTransport::Tcp => Protocol::Tcp,
                    },
                    tls_dns_name: None,
                    trust_negative_responses: true,
                    bind_addr: None,
                });
            }
            (
                ResolverConfig::from_parts(None, vec![], group),
                opts.nameservers.clone(),
            )
        };

        // Two attempts share the probe's budget; the outer timeout still bounds the whole lookup.
        resolver_opts.attempts = 2;
        resolver_opts.timeout = timeout / 2;
        resolver_opts.cache_size = 0;

        Ok(Query {
            resolver: TokioAsyncResolver::tokio(config, resolver_opts),
            name,
            record_type,
            nameservers,
            protocol: opts.protocol,
        })
    }

    fn describe(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("name".to_string(), self.name.to_string().into());
        details.insert("record_type".to_string(), self.record_type.to_string().into());
        details.insert("nameservers".to_string(), json!(self.nameservers));
        details.insert(
            "protocol".to_string(),
            match self.protocol {
                DnsTransport::Udp => "udp",
                DnsTransport::Tcp => "tcp",
            }
            .into(),
        );
        details
    }
}

/// One answer, successful or empty.
struct Answer {
    response_code: ResponseCode,
    records: Vec<Record>,
}

struct Record {
    name: String,
    record_type: String,
    ttl: u32,
    value: String,
}

impl Answer {
    fn from_lookup(lookup: &Lookup) -> Self {
        let records = lookup
            .record_iter()
            .filter_map(|record| {
                let data = record.data()?;
                Some(Record {
                    name: record.name().to_string(),
                    record_type: record.record_type().to_string(),
                    ttl: record.ttl(),
                    value: data.to_string(),
                })
            })
            .collect();
        Answer {
            response_code: ResponseCode::NoError,
            records,
        }
    }

    /// NXDOMAIN and empty NOERROR answers still describe the zone.
    fn from_error(err: &ResolveError) -> Option<Self> {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => Some(Answer {
                response_code: *response_code,
                records: Vec::new(),
            }),
            _ => None,
        }
    }

    fn values(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.value.as_str()).collect()
    }

    fn evaluate(&self, opts: &DnsOptions) -> Option<String> {
        let mut mismatches = Mismatches::new();
        match opts.expect_resolves {
            Some(true) => mismatches.check(!self.records.is_empty(), || {
                format!("expect records, got none ({:?})", self.response_code)
            }),
            Some(false) => mismatches.check(self.records.is_empty(), || {
                format!("expect no records, got {}", self.records.len())
            }),
            None => {}
        }
        if let Some(expected) = opts.expect_resolves_to.as_deref().filter(|s| !s.trim().is_empty()) {
            mismatches.check(
                self.records.iter().any(|r| record_matches(&r.value, expected)),
                || format!("expect resolves to {expected}, got [{}]", self.values().join(", ")),
            );
        }
        mismatches.into_reason()
    }

    fn write_details(&self, details: &mut Map<String, Value>) {
        let records: Vec<Value> = self
            .records
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "type": r.record_type,
                    "ttl": r.ttl,
                    "value": r.value,
                })
            })
            .collect();
        details.insert("answer_count".to_string(), records.len().into());
        details.insert("records".to_string(), Value::Array(records));
        details.insert(
            "response_code".to_string(),
            format!("{:?}", self.response_code).into(),
        );
    }
}

fn parse_record_type(raw: &str) -> Result<RecordType, ProbeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(RecordType::A);
    }
    RecordType::from_str(&raw.to_ascii_uppercase())
        .ok()
        .filter(|t| SUPPORTED_RECORD_TYPES.contains(t))
        .ok_or_else(|| ProbeError::build(format!("unsupported record type '{raw}'")))
}

fn parse_nameserver(raw: &str) -> Result<SocketAddr, ProbeError> {
    let raw = raw.trim();
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    raw.parse::<SocketAddr>()
        .map_err(|_| ProbeError::build(format!("invalid nameserver '{raw}'")))
}

/// Compares a record value with the caller's expectation, ignoring case and
/// the trailing root dot. For MX and SRV the target is the last field.
fn record_matches(value: &str, expected: &str) -> bool {
    let normalize = |s: &str| s.trim().trim_end_matches('.').to_ascii_lowercase();
    let value = normalize(value);
    let expected = normalize(expected);
    value == expected
        || value
            .rsplit(' ')
            .next()
            .is_some_and(|last| last == expected)
}

fn lookup_error(target: &str, err: &ResolveError, timeout: Duration) -> ProbeError {
    match err.kind() {
        ResolveErrorKind::Timeout => {
            ProbeError::timed_out(&format!("lookup {target}"), timeout.as_secs_f64())
        }
        _ => ProbeError::transport(format!("lookup {target}: {err}")),
    }
}
