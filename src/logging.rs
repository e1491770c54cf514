//! Thin facade over `slog`. Components take an optional parent logger and
//! fall back to a discarding root, so library users pay nothing unless they
//! opt in.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::{Config, LoggerConfig};
use std::error::Error;

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

/// Builds a root logger from a TOML logger description.
pub fn from_toml(config: &str) -> Result<Logger, Box<dyn Error>> {
    let config: LoggerConfig = serdeconv::from_toml_str(config)?;
    let logger = config.build_logger()?;

    Ok(logger)
}

/// The default root logger: terminal output on stderr at info level.
pub fn init() -> Logger {
    from_toml(DEFAULT_CONFIG).expect("Default logging config must be valid")
}
