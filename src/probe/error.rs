use std::fmt::{Display, Write};

use thiserror::Error;

use super::result::FailureKind;

/// Everything that can stop a probe before its expectations are checked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The parameters cannot form a valid request. Nothing was sent.
    #[error("build request failed: {0}")]
    Build(String),

    /// Resolution, connection, handshake, transfer or timeout failure.
    #[error("request failed: {0}")]
    Transport(String),
}

impl ProbeError {
    pub fn build(cause: impl Display) -> Self {
        ProbeError::Build(cause.to_string())
    }

    pub fn transport(cause: impl Display) -> Self {
        ProbeError::Transport(cause.to_string())
    }

    /// Transport failure carrying the whole source chain of `err`.
    pub fn transport_chain(err: &(dyn std::error::Error + 'static)) -> Self {
        ProbeError::Transport(report(err))
    }

    pub fn timed_out(what: &str, after_secs: f64) -> Self {
        ProbeError::Transport(format!("{what} timed out after {after_secs}s"))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Build(_) => FailureKind::Construction,
            ProbeError::Transport(_) => FailureKind::Transport,
        }
    }
}

/// Flattens an error and its sources into one line.
///
/// hyper and rustls keep the useful part (`Connection refused`, `UnknownIssuer`)
/// in the source chain, not in the top-level message.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let cause = src.to_string();
        if !s.contains(&cause) {
            let _ = write!(s, ": {}", cause);
        }
        err = src;
    }
    s
}
