use std::net::SocketAddr;
use std::time::Duration;

use hyper::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderMap};
use hyper::Version;
use serde_json::{Map, Value};

use super::BODY_SNIPPET_LIMIT;
use super::tls::TlsSummary;
use crate::probe::command::bounded;
use crate::probe::timing::PhaseTimer;

/// Raw measurements of a completed HTTP exchange, before normalization.
#[derive(Debug, Clone)]
pub struct HttpResponseSummary {
    pub remote_addr: SocketAddr,
    pub status: u16,
    pub version: Version,
    pub headers: HeaderMap,
    /// At most the first 4096 body bytes, exactly as received.
    pub body: Vec<u8>,
    pub tls: Option<TlsSummary>,
    /// Redirects followed before this response.
    pub redirects: usize,
    pub final_url: String,
}

impl HttpResponseSummary {
    /// Declared `Content-Length`, or -1 when the response does not declare one.
    pub fn content_length(&self) -> i64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(-1)
    }

    pub fn compressed(&self) -> bool {
        self.headers.get_all(CONTENT_ENCODING).iter().any(|v| {
            let encoding = String::from_utf8_lossy(v.as_bytes()).to_ascii_lowercase();
            encoding.contains("gzip") || encoding.contains("br")
        })
    }

    /// The body as text. Invalid sequences are replaced, then the text is cut
    /// back to a character boundary within the byte limit.
    pub fn body_snippet(&self) -> String {
        bounded(&String::from_utf8_lossy(&self.body), BODY_SNIPPET_LIMIT)
    }

    /// Builds the `details` mapping of the result envelope.
    pub fn into_details(self, timer: &PhaseTimer, total: Duration) -> Map<String, Value> {
        let snippet = self.body_snippet();
        let mut details = Map::new();
        details.insert("response_headers".to_string(), header_map(&self.headers));
        details.insert("content_length".to_string(), self.content_length().into());
        details.insert("protocol".to_string(), protocol_name(self.version).into());
        details.insert("compressed".to_string(), self.compressed().into());
        details.insert("remote_addr".to_string(), self.remote_addr.to_string().into());
        details.insert("redirects".to_string(), self.redirects.into());
        details.insert("final_url".to_string(), self.final_url.into());
        if let Some(tls) = self.tls {
            details.insert("tls_version".to_string(), tls.version.into());
            details.insert("alpn".to_string(), tls.alpn.into());
            details.insert("cert_expiry_days".to_string(), tls.cert_expiry_days.into());
        }
        timer.write_all(&mut details, total);
        details.insert("body_snippet".to_string(), snippet.into());
        details
    }
}

pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "UNKNOWN",
    }
}

/// Header name to the list of its values, in arrival order.
fn header_map(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        out.insert(name.as_str().to_string(), Value::Array(values));
    }
    Value::Object(out)
}
