pub mod formatter;

use crate::cli::TracingFormat;
use crate::config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt::format::JsonFields};

/// Default filter when `RUST_LOG` is unset: quiet dependencies, `level` for
/// this crate, and per-request HTTP tracing only at trace.
fn default_directives(level: &str) -> String {
    format!("warn,sdmx_catalog={level},sdmx_catalog::sdmx::middleware=warn")
}

/// Configure and initialize logging for the application.
pub fn setup_logging(config: &Config, tracing_format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    match tracing_format {
        TracingFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .event_format(formatter::CustomPrettyFormatter)
                    .fmt_fields(formatter::compact_fields()),
            )
            .init(),
        TracingFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .event_format(formatter::CustomJsonFormatter)
                    .fmt_fields(JsonFields::new()),
            )
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives("debug");
        assert_eq!(
            directives,
            "warn,sdmx_catalog=debug,sdmx_catalog::sdmx::middleware=warn"
        );
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
