use serdeconv;
use sloggers::{Config, LoggerConfig};

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Builds a logger from the supplied TOML configuration string. The format
/// is whatever `sloggers` accepts (terminal and file outputs, levels,
/// rotation and so on).
pub fn from_toml(config: &str) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_str(config).expect("Malformed logging configuration");

    config.build_logger().expect("Logger construction failed")
}

/// A debug-level terminal logger writing to stderr.
#[inline]
pub fn terminal() -> Logger {
    from_toml(DEFAULT_CONFIG)
}

/// A logger that drops every record. Used as the default when no parent
/// logger is supplied.
#[inline]
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
