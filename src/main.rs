use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use netprobe::prelude::*;

#[derive(Debug, Parser)]
#[clap(name = "netprobe", version, about = "Run network diagnostic probes and print JSON verdicts")]
struct Opt {
    /// Gateway configuration file. Defaults to $CONFIG_FILE, then config.yml
    #[clap(short, long)]
    config: Option<String>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one tool and print its result
    Run {
        /// Tool name, e.g. network.http
        tool: String,

        /// Parameters as a JSON object, e.g. '{"url":"https://example.com"}'
        params: Option<String>,

        /// Pretty-print the result
        #[clap(long)]
        pretty: bool,
    },
    /// Read one JSON request per line from stdin and write one result per line
    Stdio,
    /// List the registered tools
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opt.verbose { "info" } else { "warn" },
    ))
    .target(env_logger::Target::Stderr)
    .init();

    let app_config = match load_config(opt.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", netprobe::probe::report(&e));
            return ExitCode::FAILURE;
        }
    };
    if let Some(source) = &app_config.source {
        log::info!("Loaded configuration from {source}");
    }
    let gateway = match Gateway::new(&app_config.gateway) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match opt.command {
        Command::Run { tool, params, pretty } => run_once(&gateway, tool, params, pretty).await,
        Command::Stdio => serve_stdio(&gateway).await,
        Command::Tools => {
            let tools = gateway.tools();
            let width = tools.iter().map(|(name, _)| name.len()).max().unwrap_or(10);
            for (name, kind) in tools {
                println!("{name:<width$}  {kind}");
            }
            ExitCode::SUCCESS
        }
    }
}

async fn run_once(gateway: &Gateway, tool: String, params: Option<String>, pretty: bool) -> ExitCode {
    let params = match params.as_deref().map(serde_json::from_str::<Value>) {
        None => Value::Null,
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            log::error!("Invalid parameters: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = gateway.invoke(ProbeRequest::new(tool, params)).await;
    let encoded = if pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    match encoded {
        Ok(line) => println!("{line}"),
        Err(e) => {
            log::error!("Cannot encode result: {e}");
            return ExitCode::FAILURE;
        }
    }

    if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Line-delimited JSON loop: `{"tool": ..., "params": {...}}` in, `ProbeResult` out.
/// Requests are handled one at a time so results come back in request order.
async fn serve_stdio(gateway: &Gateway) -> ExitCode {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Cannot read stdin: {e}");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<ProbeRequest>(&line) {
            Ok(request) => gateway.invoke(request).await,
            Err(e) => ProbeResult::rejected("", "", ProbeError::build(format!("invalid request: {e}"))),
        };

        let mut encoded = match serde_json::to_vec(&result) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("Cannot encode result: {e}");
                continue;
            }
        };
        encoded.push(b'\n');
        if let Err(e) = stdout.write_all(&encoded).await {
            log::error!("Cannot write stdout: {e}");
            return ExitCode::FAILURE;
        }
        if let Err(e) = stdout.flush().await {
            log::error!("Cannot write stdout: {e}");
            return ExitCode::FAILURE;
        }
    }
}
