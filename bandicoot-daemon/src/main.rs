use anyhow::Result;
use clap::Parser;

use bandicoot_daemon::cli::DaemonCli;
use bandicoot_daemon::logging;
use bandicoot_daemon::orchestrator::{self, ConfigSource, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let (config, source) = orchestrator::load_config(&cli).await?;

    if cli.validate {
        println!(
            "configuration valid ({})",
            orchestrator::describe_source(&source)
        );
        return Ok(());
    }

    // 로깅 초기화
    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %orchestrator::describe_source(&source),
        "bandicoot-daemon starting"
    );
    if source == ConfigSource::Defaults {
        tracing::warn!(
            path = %cli.config.display(),
            "config file not found, using built-in defaults"
        );
    }

    let mut orchestrator = Orchestrator::build(config)?;
    orchestrator.run().await?;

    tracing::info!(
        uptime_secs = orchestrator.uptime_secs(),
        "bandicoot-daemon shut down"
    );
    Ok(())
}
