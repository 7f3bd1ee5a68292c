//! Tracing subscriber bootstrap

use keystone_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level when set. Output is JSON when
/// `json_format` is enabled.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .init();
    }
}

/// Filter applied when `RUST_LOG` is unset
pub fn default_filter(level: &str) -> EnvFilter {
    let level = match level.to_ascii_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error") => l.to_string(),
        _ => "info".to_string(),
    };
    EnvFilter::new(format!(
        "keystone_api={level},keystone_core={level},tower_http={level},sqlx=warn"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_level() {
        let filter = default_filter("DEBUG").to_string();
        assert!(filter.contains("keystone_api=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert!(default_filter("loud").to_string().contains("keystone_api=info"));
    }
}
