use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use super::ConfigError;
use super::probe_config::GatewayConfig;

const DEFAULT_CONFIG_FILE: &str = "config.yml";

pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub source: Option<String>,
}

/// Load the application configuration from a YAML file and environment variables.
/// The file is taken from `--config`, then the `CONFIG_FILE` environment variable,
/// then `config.yml`. Only a file that was asked for explicitly has to exist;
/// without one the built-in tool registry is used.
/// `DNS_HOSTS` (comma separated) and `NETPROBE_MAX_RETRIES` override the file.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let explicit = path.map(str::to_string).or_else(|| env::var("CONFIG_FILE").ok());
    let location = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let (mut gateway, source) = if explicit.is_some() || Path::new(&location).exists() {
        let config_str = std::fs::read_to_string(&location).map_err(|source| ConfigError::Read {
            path: location.clone(),
            source,
        })?;
        let gateway = parse_config(&config_str).map_err(|source| ConfigError::Parse {
            path: location.clone(),
            source,
        })?;
        (gateway, Some(location))
    } else {
        log::debug!("No {DEFAULT_CONFIG_FILE} found, using the built-in tool registry");
        (GatewayConfig::default(), None)
    };

    if let Ok(dns_hosts) = env::var("DNS_HOSTS") {
        gateway.dns_hosts = split_hosts(&dns_hosts);
    }
    if let Ok(retries) = env::var("NETPROBE_MAX_RETRIES") {
        gateway.retry.max_retries = retries
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "NETPROBE_MAX_RETRIES",
                value: retries.clone(),
            })?;
    }

    validate_dns_hosts(&gateway.dns_hosts)?;
    log::info!("Using DNS hosts: {:?}", gateway.dns_hosts);

    Ok(AppConfig { gateway, source })
}

pub fn parse_config(yaml: &str) -> Result<GatewayConfig, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    serde_yaml::from_str(yaml)
}

fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validate_dns_hosts(hosts: &[String]) -> Result<(), ConfigError> {
    for host in hosts {
        if host.parse::<IpAddr>().is_err() && host.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "dns_hosts",
                value: host.clone(),
            });
        }
    }
    Ok(())
}
