use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;

use crate::{
    demo::{Demo, DemoSettings},
    error::ClientError,
};

#[derive(Debug, Parser, Clone, Deserialize)]
#[clap(about = "Demo client for the greeting and calculator gRPC services")]
#[command(version)]
#[serde(default)]
pub struct Config {
    /// Demonstration to run
    #[arg(value_enum, default_value_t = Demo::GreetWithDeadline)]
    pub demo: Demo,

    /// gRPC server endpoint URL
    #[arg(
        long,
        short = 'g',
        env = "RPC_GRPC_URL",
        default_value = "http://localhost:50051"
    )]
    pub grpc_url: String,

    /// Path to CA file
    #[arg(long, env = "RPC_GRPC_CA")]
    pub grpc_ca: Option<PathBuf>,

    /// How long (in seconds) to wait for a connection to the server
    #[arg(long, env = "RPC_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Compress requests with gzip and accept gzip-compressed responses
    #[arg(long, env = "RPC_GZIP")]
    pub gzip: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, short = 'l', env = "RPC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Deadline (in milliseconds) applied to every call of the demo
    #[arg(long, short = 'd', env = "RPC_DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Pause (in milliseconds) between streamed requests
    #[arg(long, short = 'i', env = "RPC_SEND_INTERVAL_MS", default_value = "1000")]
    pub send_interval_ms: u64,

    /// Configuration file path
    #[arg(long = "config", short)]
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Config {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn demo_settings(&self) -> DemoSettings {
        DemoSettings {
            deadline: self.deadline_ms.map(Duration::from_millis),
            send_interval: Duration::from_millis(self.send_interval_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo: Demo::default(),
            grpc_url: "http://localhost:50051".into(),
            grpc_ca: None,
            connect_timeout_secs: 10,
            gzip: false,
            log_level: "info".into(),
            deadline_ms: None,
            send_interval_ms: 1000,
            config_path: None,
        }
    }
}

pub fn get_config() -> Result<Config, ClientError> {
    // parse CLI arguments to get config file path
    let cli_config = Config::parse();

    // load config from file if one was specified
    if let Some(config_path) = cli_config.config_path {
        let config_toml = fs::read_to_string(config_path)
            .map_err(|err| ClientError::InvalidConfigFile(err.to_string()))?;
        let file_config: Config = toml::from_str(&config_toml)
            .map_err(|err| ClientError::InvalidConfigFile(err.message().to_string()))?;
        return Ok(file_config);
    }

    Ok(cli_config)
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Config::command().debug_assert();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let config = Config::parse_from(["rpc-calls"]);
        assert_eq!(config.demo, Demo::GreetWithDeadline);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        let settings = config.demo_settings();
        assert_eq!(settings.deadline, None);
        assert_eq!(settings.send_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_cli_arguments() {
        let config = Config::parse_from([
            "rpc-calls",
            "find-maximum",
            "--grpc-url",
            "https://calc.example.com:443",
            "--deadline-ms",
            "1500",
            "--send-interval-ms",
            "0",
            "--gzip",
        ]);
        assert_eq!(config.demo, Demo::FindMaximum);
        assert_eq!(config.grpc_url, "https://calc.example.com:443");
        assert!(config.gzip);
        let settings = config.demo_settings();
        assert_eq!(settings.deadline, Some(Duration::from_millis(1500)));
        assert_eq!(settings.send_interval, Duration::ZERO);
    }

    #[test]
    fn test_file_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            demo = "square-root"
            grpc_url = "http://calculator:50051"
            deadline_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.demo, Demo::SquareRoot);
        assert_eq!(config.grpc_url, "http://calculator:50051");
        assert_eq!(config.demo_settings().deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.send_interval_ms, 1000);
        assert_eq!(config.log_level, "info");
    }
}
