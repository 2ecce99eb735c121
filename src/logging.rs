use env_logger::{Builder, Env};

use crate::error::ClientError;

/// Installs the global logger. `RUST_LOG`, when set, takes precedence over `level`.
pub fn init(level: &str) -> Result<(), ClientError> {
    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init()?;
    debug!("Logger initialized with default level {level}");
    Ok(())
}
