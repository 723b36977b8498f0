pub mod app_config;
pub mod probe_config;

use thiserror::Error;

pub use app_config::{AppConfig, load_config};
pub use probe_config::{GatewayConfig, RetryPolicy, ToolConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid {key} value '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("tool '{0}' is registered more than once")]
    DuplicateTool(String),
}
