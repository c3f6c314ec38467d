use clap::{Parser, Subcommand, ValueEnum};

/// SDMX structural metadata collector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored, human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler and crawl workers until interrupted (default)
    Serve,
    /// Crawl one provider now and exit
    Collect {
        /// Provider id in `sdmx_provider`
        provider_id: i32,
    },
    /// Crawl every provider sequentially and exit
    CollectAll,
}

impl Args {
    /// The requested subcommand, `serve` when none was given.
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let args = Args::parse_from(["sdmx-catalog"]);
        assert_eq!(args.command_or_default(), Command::Serve);
    }

    #[test]
    fn test_collect_takes_provider_id() {
        let args = Args::parse_from(["sdmx-catalog", "--tracing", "json", "collect", "4"]);
        assert_eq!(args.tracing, TracingFormat::Json);
        assert_eq!(args.command_or_default(), Command::Collect { provider_id: 4 });
    }

    #[test]
    fn test_collect_all_subcommand() {
        let args = Args::parse_from(["sdmx-catalog", "collect-all"]);
        assert_eq!(args.command_or_default(), Command::CollectAll);
    }

    #[test]
    fn test_rejects_non_numeric_provider() {
        assert!(Args::try_parse_from(["sdmx-catalog", "collect", "insee"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
