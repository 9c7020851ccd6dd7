use clap::Parser;
use tracing::info;

use movieapp_server::metrics::init_metrics;
use movieapp_server::model::config::{Cli, Configuration};
use movieapp_server::startup::Application;
use movieapp_server::startup::logging::init_logging;
use movieapp_server::startup::shutdown::wait_for_shutdown_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::from_cli(&cli)?;

    // Keep the guard alive so buffered file output is flushed on exit
    let _logging_guard = init_logging(&configuration.logging_config())?;
    init_metrics();

    let kinds = cli.service.kinds();
    info!(
        "Starting movieapp: {}",
        kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
    );

    let shutdown = wait_for_shutdown_signal();
    let application = Application::start(&kinds, configuration, shutdown).await?;
    application.run_until_shutdown().await
}
