use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Either, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{
    ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, HeaderMap, HeaderName, HeaderValue,
    LOCATION, USER_AGENT, WWW_AUTHENTICATE,
};
use hyper::{Method, Request, Response, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use url::{Host, Position, Url};

use super::HttpOptions;
use super::result::HttpResponseSummary;
use super::tls::{self, TlsSummary};
use crate::dns_probe;
use crate::probe::expect::evaluate_http;
use crate::probe::timing::{Phase, PhaseTimer, millis};
use crate::probe::{ProbeError, ProbeResult, report, resolve_timeout, tool_name};

pub const DEFAULT_TOOL: &str = "network.http";
pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0;
/// Upper bound on how much of a response body is read.
pub const BODY_SNIPPET_LIMIT: usize = 4096;
/// Redirects followed before the exchange is abandoned.
pub const MAX_REDIRECTS: usize = 10;

const DEFAULT_USER_AGENT: &str = concat!("netprobe/", env!("CARGO_PKG_VERSION"));

type RequestBody = Either<Full<Bytes>, Empty<Bytes>>;

/// Performs one HTTP request and reports it as a [`ProbeResult`].
///
/// The connection is set up by hand (resolve, connect, handshake, send) so that
/// every phase can be timed. A fresh connection is used for every call and for
/// every redirect hop; hops share the timeout and their phases add up.
pub async fn probe_http(opts: HttpOptions) -> ProbeResult {
    let tool = tool_name(opts.tool.as_deref(), DEFAULT_TOOL);
    let timeout = resolve_timeout(opts.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    let target = opts.url.clone();

    let mut timer = PhaseTimer::start();
    let request = match PreparedRequest::build(&opts) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("[{tool}] {target}: {err}");
            return ProbeResult::rejected(tool, target, err);
        }
    };

    let outcome = tokio::time::timeout(timeout, exchange(&request, &mut timer)).await;
    let total = timer.elapsed();

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(_) => Err(ProbeError::timed_out(
            &format!("{} {}", request.method, target),
            timeout.as_secs_f64(),
        )),
    };

    match outcome {
        Ok(response) => {
            let status = response.status;
            let mismatch = evaluate_http(
                status,
                &response.body,
                opts.expected_status(),
                opts.expected_substring(),
            );
            log::debug!(
                "[{tool}] {} {target}: {status} after {} redirects in {:.0}ms",
                request.method,
                response.redirects,
                millis(total)
            );
            let details = response.into_details(&timer, total);
            ProbeResult::completed(tool, target, Some(status), millis(total), details, mismatch)
        }
        Err(err) => {
            log::debug!("[{tool}] {} {target}: {err}", request.method);
            let mut details = serde_json::Map::new();
            timer.write_observed(&mut details, total);
            ProbeResult::failed(tool, target, err, millis(total), details)
        }
    }
}

/// A validated request, ready to be sent over a fresh connection.
#[derive(Clone)]
struct PreparedRequest {
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    insecure: bool,
    endpoint: Endpoint,
}

/// Where a request goes: the URL and everything derived from it.
#[derive(Clone)]
struct Endpoint {
    url: Url,
    host: String,
    port: u16,
    host_header: HeaderValue,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl Endpoint {
    fn new(url: Url, insecure: bool) -> Result<Self, ProbeError> {
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(ProbeError::build(format!(
                    "unsupported protocol scheme \"{other}\""
                )));
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(ProbeError::build(format!("no host in \"{url}\""))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::build(format!("no port for \"{url}\"")))?;

        let host_header = HeaderValue::from_str(&url[Position::BeforeHost..Position::AfterPort])
            .map_err(ProbeError::build)?;

        let tls = if secure {
            Some((tls::connector(insecure)?, tls::server_name(&host)?))
        } else {
            None
        };

        Ok(Endpoint {
            url,
            host,
            port,
            host_header,
            tls,
        })
    }
}

impl PreparedRequest {
    fn build(opts: &HttpOptions) -> Result<Self, ProbeError> {
        let url = Url::parse(opts.url.trim())
            .map_err(|e| ProbeError::build(format!("parse \"{}\": {e}", opts.url)))?;
        let endpoint = Endpoint::new(url, opts.insecure_skip_verify)?;

        let method = match opts.method.trim().to_uppercase() {
            m if m.is_empty() => Method::GET,
            m => Method::from_bytes(m.as_bytes())
                .map_err(|_| ProbeError::build(format!("invalid method \"{m}\"")))?,
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &opts.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ProbeError::build(format!("invalid header name \"{name}\"")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ProbeError::build(format!("invalid value for header \"{name}\"")))?;
            headers.insert(name, value);
        }

        Ok(PreparedRequest {
            method,
            headers,
            body: opts.body.as_ref().filter(|b| !b.is_empty()).map(|b| Bytes::from(b.clone())),
            insecure: opts.insecure_skip_verify,
            endpoint,
        })
    }

    /// The request to send after a redirect `status` pointing at `location`.
    ///
    /// 301, 302 and 303 drop the body and turn anything but GET and HEAD into
    /// GET. 307 and 308 repeat the request as it was. Credentials are not
    /// carried to another host.
    fn redirect(&self, status: u16, location: &HeaderValue) -> Result<Self, ProbeError> {
        let location = location
            .to_str()
            .map_err(|_| ProbeError::transport(format!("{} {}: invalid Location header", self.method, self.endpoint.url)))?;
        let url = self
            .endpoint
            .url
            .join(location)
            .map_err(|e| ProbeError::transport(format!("failed to parse Location header \"{location}\": {e}")))?;
        let endpoint = Endpoint::new(url, self.insecure).map_err(|e| match e {
            ProbeError::Build(cause) | ProbeError::Transport(cause) => {
                ProbeError::transport(format!("redirect to \"{location}\": {cause}"))
            }
        })?;

        let rewrite = matches!(status, 301..=303);
        let mut headers = self.headers.clone();
        let (method, body) = if rewrite {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            let method = if self.method == Method::HEAD { Method::HEAD } else { Method::GET };
            (method, None)
        } else {
            (self.method.clone(), self.body.clone())
        };
        if endpoint.host != self.endpoint.host {
            for name in [AUTHORIZATION, WWW_AUTHENTICATE, COOKIE, HOST] {
                headers.remove(name);
            }
        }

        Ok(PreparedRequest {
            method,
            headers,
            body,
            insecure: self.insecure,
            endpoint,
        })
    }

    /// HTTP/1 requests carry an origin-form target and a Host header, HTTP/2
    /// requests the absolute form the `:authority` pseudo-header is taken from.
    fn to_request(&self, h2: bool) -> Result<Request<RequestBody>, ProbeError> {
        let url = &self.endpoint.url;
        let uri = if h2 {
            &url[..Position::AfterQuery]
        } else {
            &url[Position::BeforePath..Position::AfterQuery]
        };

        let body = match &self.body {
            Some(bytes) => Either::Left(Full::new(bytes.clone())),
            None => Either::Right(Empty::new()),
        };

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .version(if h2 { Version::HTTP_2 } else { Version::HTTP_11 })
            .body(body)
            .map_err(ProbeError::build)?;

        let headers = request.headers_mut();
        if !h2 {
            headers.insert(HOST, self.endpoint.host_header.clone());
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        Ok(request)
    }
}

/// Sends `request`, following redirects up to [`MAX_REDIRECTS`].
async fn exchange(request: &PreparedRequest, timer: &mut PhaseTimer) -> Result<HttpResponseSummary, ProbeError> {
    let mut current = request.clone();
    let mut redirects = 0;
    loop {
        let mut response = fetch(&current, timer).await?;
        let location = match response.status {
            301 | 302 | 303 | 307 | 308 => response.headers.get(LOCATION).cloned(),
            _ => None,
        };
        let Some(location) = location else {
            response.redirects = redirects;
            return Ok(response);
        };
        if redirects == MAX_REDIRECTS {
            return Err(ProbeError::transport(format!(
                "{} {}: stopped after {MAX_REDIRECTS} redirects",
                request.method, request.endpoint.url
            )));
        }

        let next = current.redirect(response.status, &location)?;
        log::debug!(
            "{} {}: {} to {}",
            current.method,
            current.endpoint.url,
            response.status,
            next.endpoint.url
        );
        current = next;
        redirects += 1;
    }
}

/// One request over one fresh connection.
async fn fetch(request: &PreparedRequest, timer: &mut PhaseTimer) -> Result<HttpResponseSummary, ProbeError> {
    let remote_addr = resolve(&request.endpoint, timer).await?;

    let stream = timer
        .time(Phase::TcpConnection, TcpStream::connect(remote_addr))
        .await
        .map_err(|e| ProbeError::transport(format!("dial tcp {remote_addr}: {e}")))?;
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("set TCP_NODELAY on {remote_addr}: {e}");
    }

    match &request.endpoint.tls {
        Some((connector, server_name)) => {
            let host = &request.endpoint.host;
            let stream = timer
                .time(Phase::TlsHandshake, connector.connect(server_name.clone(), stream))
                .await
                .map_err(|e| ProbeError::transport(format!("tls handshake with {host}: {}", report(&e))))?;
            let summary = TlsSummary::from_connection(stream.get_ref().1);
            let h2 = summary.negotiated_h2();
            let mut response = send(request, stream, h2, remote_addr, timer).await?;
            response.tls = Some(summary);
            Ok(response)
        }
        None => send(request, stream, false, remote_addr, timer).await,
    }
}

async fn resolve(endpoint: &Endpoint, timer: &mut PhaseTimer) -> Result<SocketAddr, ProbeError> {
    if let Ok(ip) = endpoint.host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, endpoint.port));
    }

    let resolver = dns_probe::system_resolver();
    let lookup = timer
        .time(Phase::DnsLookup, resolver.lookup_ip(endpoint.host.as_str()))
        .await
        .map_err(|e| ProbeError::transport(format!("lookup {}: {e}", endpoint.host)))?;

    lookup
        .iter()
        .next()
        .map(|ip| SocketAddr::new(ip, endpoint.port))
        .ok_or_else(|| ProbeError::transport(format!("lookup {}: no addresses", endpoint.host)))
}

async fn send<T>(
    request: &PreparedRequest,
    io: T,
    h2: bool,
    remote_addr: SocketAddr,
    timer: &mut PhaseTimer,
) -> Result<HttpResponseSummary, ProbeError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(io);
    let outgoing = request.to_request(h2)?;

    // The driver lives until the snippet has been read, then is aborted.
    let (response, _driver) = if h2 {
        let (mut sender, conn) = hyper::client::conn::http2::handshake(TokioExecutor::new(), io)
            .await
            .map_err(|e| ProbeError::transport_chain(&e))?;
        let driver = ConnectionDriver::spawn(conn);
        let response = timed_send(timer, sender.send_request(outgoing)).await?;
        (response, driver)
    } else {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::transport_chain(&e))?;
        let driver = ConnectionDriver::spawn(conn);
        let response = timed_send(timer, sender.send_request(outgoing)).await?;
        (response, driver)
    };

    let first_byte = Instant::now();
    let status = response.status().as_u16();
    let version = response.version();
    let headers = response.headers().clone();

    let mut body = response.into_body();
    let mut snippet = Vec::with_capacity(BODY_SNIPPET_LIMIT);
    if let Err(e) = read_snippet(&mut body, &mut snippet, BODY_SNIPPET_LIMIT).await {
        log::debug!("reading body from {}: {}", request.endpoint.host, report(&e));
    }
    timer.record_since(Phase::ContentTransfer, first_byte);

    Ok(HttpResponseSummary {
        remote_addr,
        status,
        version,
        headers,
        body: snippet,
        tls: None,
        redirects: 0,
        final_url: request.endpoint.url.to_string(),
    })
}

async fn timed_send<F>(timer: &mut PhaseTimer, send: F) -> Result<Response<Incoming>, ProbeError>
where
    F: Future<Output = Result<Response<Incoming>, hyper::Error>>,
{
    timer
        .time(Phase::ServerProcessing, send)
        .await
        .map_err(|e| ProbeError::transport_chain(&e))
}

/// Reads body frames into `buf` until `limit` bytes are held or the body ends.
/// Anything past the limit is left unread.
async fn read_snippet(body: &mut Incoming, buf: &mut Vec<u8>, limit: usize) -> Result<(), hyper::Error> {
    while buf.len() < limit {
        let Some(frame) = body.frame().await else {
            break;
        };
        if let Ok(data) = frame?.into_data() {
            let take = data.len().min(limit - buf.len());
            buf.extend_from_slice(&data[..take]);
        }
    }
    Ok(())
}

/// Drives a hyper client connection for the duration of one probe.
struct ConnectionDriver(JoinHandle<()>);

impl ConnectionDriver {
    fn spawn<F>(conn: F) -> Self
    where
        F: Future<Output = Result<(), hyper::Error>> + Send + 'static,
    {
        ConnectionDriver(tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::debug!("connection closed: {e}");
            }
        }))
    }
}

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn hello_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_success_without_expectations() {
        let server = hello_server().await;
        let result = probe_http(HttpOptions::get(format!("{}/ok", server.uri()))).await;

        assert!(result.success, "{}", result.error);
        assert_eq!(result.error, "");
        assert_eq!(result.tool, "network.http");
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.details["body_snippet"], "hello");
        assert_eq!(result.details["protocol"], "HTTP/1.1");
        assert_eq!(result.details["content_length"], 5);
        assert_eq!(result.details["dns_lookup_ms"], 0.0);
        assert_eq!(result.details["tls_handshake_ms"], 0.0);
        for key in ["tcp_connection_ms", "server_processing_ms", "content_transfer_ms", "total_time_ms"] {
            assert!(result.details[key].is_f64(), "{key} missing");
        }
    }

    #[tokio::test]
    async fn test_status_expectation_mismatch() {
        let server = hello_server().await;
        let opts = HttpOptions {
            expect_status: Some(404),
            ..HttpOptions::get(format!("{}/ok", server.uri()))
        };
        let result = probe_http(opts).await;

        assert!(!result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.error, "expect status 404, got 200");
    }

    #[tokio::test]
    async fn test_substring_expectation_mismatch() {
        let server = hello_server().await;
        let opts = HttpOptions {
            expect_contains: Some("missing-token".to_string()),
            ..HttpOptions::get(format!("{}/ok", server.uri()))
        };
        let result = probe_http(opts).await;

        assert!(!result.success);
        assert_eq!(result.error, "response not contains expected substring");
    }

    #[tokio::test]
    async fn test_both_expectations_fail() {
        let server = hello_server().await;
        let opts = HttpOptions {
            expect_status: Some(500),
            expect_contains: Some("missing-token".to_string()),
            ..HttpOptions::get(format!("{}/ok", server.uri()))
        };
        let result = probe_http(opts).await;

        assert_eq!(
            result.error,
            "expect status 500, got 200; response not contains expected substring"
        );
    }

    #[tokio::test]
    async fn test_matching_expectations_pass() {
        let server = hello_server().await;
        let opts = HttpOptions {
            expect_status: Some(200),
            expect_contains: Some("ell".to_string()),
            ..HttpOptions::get(format!("{}/ok", server.uri()))
        };
        assert!(probe_http(opts).await.success);
    }

    #[tokio::test]
    async fn test_empty_method_defaults_to_get_and_lowercase_is_normalized() {
        let server = hello_server().await;
        for m in ["", "get", "GeT"] {
            let opts = HttpOptions {
                method: m.to_string(),
                ..HttpOptions::get(format!("{}/ok", server.uri()))
            };
            let result = probe_http(opts).await;
            assert_eq!(result.status_code, Some(200), "method {m:?}");
        }
    }

    #[tokio::test]
    async fn test_headers_and_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("x-probe", "1"))
            .and(header("user-agent", "custom-agent"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let mut opts = HttpOptions::get(format!("{}/submit", server.uri()));
        opts.method = "post".to_string();
        opts.body = Some("payload".to_string());
        opts.headers.insert("X-Probe".to_string(), "1".to_string());
        opts.headers.insert("User-Agent".to_string(), "custom-agent".to_string());
        opts.expect_status = Some(201);

        let result = probe_http(opts).await;
        assert!(result.success, "{}", result.error);
    }

    #[tokio::test]
    async fn test_body_snippet_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/large"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(20_000)))
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(format!("{}/large", server.uri()))).await;

        assert!(result.success, "{}", result.error);
        let snippet = result.details["body_snippet"].as_str().expect("snippet");
        assert_eq!(snippet.len(), BODY_SNIPPET_LIMIT);
        assert_eq!(result.details["content_length"], 20_000);
    }

    #[tokio::test]
    async fn test_repeat_probe_is_stable() {
        let server = hello_server().await;
        let url = format!("{}/ok", server.uri());
        let first = probe_http(HttpOptions::get(url.clone())).await;
        let second = probe_http(HttpOptions::get(url)).await;

        assert_eq!(first.success, second.success);
        assert_eq!(first.status_code, second.status_code);
        assert_eq!(first.details["body_snippet"], second.details["body_snippet"]);
        assert_eq!(first.details["response_headers"], second.details["response_headers"]);
    }

    #[tokio::test]
    async fn test_malformed_url_is_a_build_failure() {
        let result = probe_http(HttpOptions::get("not a url")).await;

        assert!(!result.success);
        assert!(result.error.starts_with("build request failed:"), "{}", result.error);
        assert_eq!(result.status_code, None);
        assert!(result.details.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_and_bad_method() {
        let result = probe_http(HttpOptions::get("ftp://example.test/file")).await;
        assert!(result.error.starts_with("build request failed:"));

        let opts = HttpOptions {
            method: "GE T".to_string(),
            ..HttpOptions::get("http://example.test/")
        };
        let result = probe_http(opts).await;
        assert!(result.error.starts_with("build request failed:"), "{}", result.error);
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let result = probe_http(HttpOptions::get(format!("http://{addr}/"))).await;

        assert!(!result.success);
        assert!(result.error.starts_with("request failed:"), "{}", result.error);
        assert_eq!(result.status_code, None);
        assert!(result.details.contains_key("total_time_ms"));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let opts = HttpOptions {
            timeout_seconds: 1.0,
            ..HttpOptions::get(format!("http://{addr}/slow"))
        };
        let started = Instant::now();
        let result = probe_http(opts).await;

        assert!(!result.success);
        assert!(result.error.starts_with("request failed:"), "{}", result.error);
        assert!(result.error.contains("timed out"), "{}", result.error);
        assert_eq!(result.status_code, None);
        assert!(started.elapsed() < Duration::from_secs(5));
        // the connect phase completed before the server went quiet
        assert!(result.details.contains_key("tcp_connection_ms"));
        assert!(!result.details.contains_key("content_transfer_ms"));
    }

    #[tokio::test]
    async fn test_custom_tool_name() {
        let server = hello_server().await;
        let opts = HttpOptions {
            tool: Some("custom.http".to_string()),
            ..HttpOptions::get(format!("{}/ok", server.uri()))
        };
        assert_eq!(probe_http(opts).await.tool, "custom.http");
    }

    #[tokio::test]
    async fn test_moved_url_is_followed() {
        let server = hello_server().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/ok"))
            .expect(1)
            .mount(&server)
            .await;

        let opts = HttpOptions {
            expect_status: Some(200),
            ..HttpOptions::get(format!("{}/old", server.uri()))
        };
        let result = probe_http(opts).await;

        assert!(result.success, "{}", result.error);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.target, format!("{}/old", server.uri()));
        assert_eq!(result.details["body_snippet"], "hello");
        assert_eq!(result.details["redirects"], 1);
        assert_eq!(result.details["final_url"], format!("{}/ok", server.uri()));
    }

    #[tokio::test]
    async fn test_see_other_turns_post_into_get() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/form"))
            .respond_with(ResponseTemplate::new(303).insert_header("Location", "/done"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/done"))
            .respond_with(ResponseTemplate::new(200).set_body_string("thanks"))
            .expect(1)
            .mount(&server)
            .await;

        let mut opts = HttpOptions::get(format!("{}/form", server.uri()));
        opts.method = "POST".to_string();
        opts.body = Some("payload".to_string());
        opts.expect_contains = Some("thanks".to_string());

        let result = probe_http(opts).await;
        assert!(result.success, "{}", result.error);
        assert_eq!(result.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_temporary_redirect_repeats_method_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "/v2"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut opts = HttpOptions::get(format!("{}/v1", server.uri()));
        opts.method = "post".to_string();
        opts.body = Some("payload".to_string());
        opts.expect_status = Some(201);

        let result = probe_http(opts).await;
        assert!(result.success, "{}", result.error);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_abandoned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .expect(MAX_REDIRECTS as u64 + 1)
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(format!("{}/loop", server.uri()))).await;

        assert!(!result.success);
        assert!(result.error.starts_with("request failed:"), "{}", result.error);
        assert!(result.error.ends_with("stopped after 10 redirects"), "{}", result.error);
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_the_answer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302))
            .expect(1)
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(format!("{}/nowhere", server.uri()))).await;

        assert!(result.success, "{}", result.error);
        assert_eq!(result.status_code, Some(302));
        assert_eq!(result.details["redirects"], 0);
    }

    #[tokio::test]
    async fn test_redirect_to_unsupported_scheme_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "ftp://example.test/file"))
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(server.uri())).await;

        assert!(!result.success);
        assert!(result.error.starts_with("request failed:"), "{}", result.error);
        assert!(result.error.contains("unsupported protocol scheme"), "{}", result.error);
    }

    #[tokio::test]
    async fn test_multibyte_body_snippet_stays_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("€".repeat(3000)))
            .mount(&server)
            .await;

        let opts = HttpOptions {
            expect_contains: Some("€€".to_string()),
            ..HttpOptions::get(server.uri())
        };
        let result = probe_http(opts).await;

        assert!(result.success, "{}", result.error);
        let snippet = result.details["body_snippet"].as_str().expect("snippet");
        assert!(snippet.len() <= BODY_SNIPPET_LIMIT, "{} bytes", snippet.len());
        assert_eq!(snippet, "€".repeat(1365));
    }

    #[tokio::test]
    async fn test_binary_body_snippet_stays_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xffu8; 10_000]))
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(server.uri())).await;

        assert!(result.success, "{}", result.error);
        let snippet = result.details["body_snippet"].as_str().expect("snippet");
        assert!(snippet.len() <= BODY_SNIPPET_LIMIT, "{} bytes", snippet.len());
        assert_eq!(result.details["content_length"], 10_000);
    }

    #[tokio::test]
    async fn test_latency_covers_the_phases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("slow").set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let result = probe_http(HttpOptions::get(server.uri())).await;

        assert!(result.success, "{}", result.error);
        let phase = |p: Phase| result.details[p.key()].as_f64().expect("phase");
        assert!(phase(Phase::ServerProcessing) >= 200.0);
        let sum: f64 = Phase::ALL.into_iter().map(phase).sum();
        assert!(result.latency_ms >= sum, "{} < {sum}", result.latency_ms);
        assert_eq!(result.details["total_time_ms"], result.latency_ms);
    }

    #[tokio::test]
    async fn test_phases_are_recorded_in_wire_order() {
        let server = hello_server().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/ok"))
            .mount(&server)
            .await;

        let request = PreparedRequest::build(&HttpOptions::get(format!("{}/ok", server.uri()))).expect("request");
        let mut timer = PhaseTimer::start();
        exchange(&request, &mut timer).await.expect("response");
        assert_eq!(
            timer.recorded(),
            vec![Phase::TcpConnection, Phase::ServerProcessing, Phase::ContentTransfer]
        );

        let request = PreparedRequest::build(&HttpOptions::get(format!("{}/old", server.uri()))).expect("request");
        let mut timer = PhaseTimer::start();
        let response = exchange(&request, &mut timer).await.expect("response");
        assert_eq!(response.redirects, 1);
        assert_eq!(timer.recorded().len(), 6);
        assert!(timer.elapsed() >= Phase::ALL.into_iter().filter_map(|p| timer.get(p)).sum::<Duration>());
    }
}
