use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Settings;
use crate::error::Error;
use crate::types::Result;

/// Parse a configured log level, falling back to `info`
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the logging system
pub fn init_logging(settings: &Settings) -> Result<()> {
    let level = parse_level(&settings.general.log_level);

    // RUST_LOG directives refine the configured level
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let result = if settings.telemetry.structured_logging {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).json())
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init()
    };

    result.map_err(|e| Error::Config(format!("Failed to set global default subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_second_init_fails() {
        let settings = Settings::default();
        // Another test may have installed a subscriber first
        let _ = init_logging(&settings);
        assert!(init_logging(&settings).is_err());
    }
}
