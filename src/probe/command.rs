use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::error::ProbeError;

/// Captured output of a diagnostic command that ran to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Best single-line explanation for a failed run.
    pub fn failure_reason(&self, program: &str) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.lines().last().unwrap_or(stderr).to_string();
        }
        match self.exit_code {
            Some(code) => format!("{program} exited with status {code}"),
            None => format!("{program} terminated by signal"),
        }
    }
}

/// Runs `program` with `args`, bounded by `timeout`.
///
/// The child is killed if the timeout fires or the returned future is dropped.
pub async fn run(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, ProbeError> {
    log::debug!("running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProbeError::transport(format!("{program} is not installed")),
            _ => ProbeError::transport(format!("failed to start {program}: {e}")),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| ProbeError::transport(format!("{program}: {e}")))?,
        Err(_) => return Err(ProbeError::timed_out(program, timeout.as_secs_f64())),
    };

    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Keeps raw tool output small enough for a result envelope.
pub fn bounded(output: &str, limit: usize) -> String {
    if output.len() <= limit {
        return output.to_string();
    }
    let mut end = limit;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output[..end].to_string()
}

/// Hosts are passed straight to a command line, so refuse anything that
/// could be read as an option or split into several arguments.
pub fn validate_host(host: &str) -> Result<(), ProbeError> {
    if host.is_empty() {
        return Err(ProbeError::build("host is required"));
    }
    if host.starts_with('-') || host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProbeError::build(format!("invalid host '{host}'")));
    }
    Ok(())
}
