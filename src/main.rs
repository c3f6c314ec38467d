use clap::Parser;
use sdmx_catalog::app::App;
use sdmx_catalog::cli::Args;
use sdmx_catalog::config::Config;
use sdmx_catalog::logging::setup_logging;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let command = args.command_or_default();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = Config::from_env().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        command = ?command,
        "starting sdmx-catalog"
    );

    let app = App::new(config)
        .await
        .expect("Failed to initialize application");
    app.run(command).await
}
