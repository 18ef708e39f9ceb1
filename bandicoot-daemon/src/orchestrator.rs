//! Daemon orchestration -- configuration, wiring, and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, creates the Docker client, selects the
//! firewall gateway, builds the [`FirewallWatcher`], and runs it until a
//! shutdown signal arrives.
//!
//! # Configuration Precedence
//!
//! CLI flag > `BANDICOOT_*` environment variable > config file > defaults

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use bandicoot_core::config::BandicootConfig;
use bandicoot_core::error::{BandicootError, ConfigError};
use bandicoot_core::pipeline::{HealthStatus, Pipeline};
use bandicoot_firewall_sync::{
    BollardDockerClient, ConfiguredGateway, FirewallGateway, FirewallWatcher,
    FirewallWatcherBuilder, SyncConfig,
};

use crate::cli::DaemonCli;
use crate::metrics_server;

/// Interval between periodic health checks while running.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file.
    File(PathBuf),
    /// The default config path did not exist; built-in defaults were used.
    Defaults,
}

/// Load configuration and apply environment and CLI overrides.
///
/// A missing file is only tolerated at the default path; an explicit
/// `--config` that does not exist is an error.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, if a
/// `BANDICOOT_*` variable holds an unparsable value, or if the final
/// configuration fails validation.
pub async fn load_config(cli: &DaemonCli) -> Result<(BandicootConfig, ConfigSource)> {
    let (mut config, source) = match BandicootConfig::from_file(&cli.config).await {
        Ok(config) => (config, ConfigSource::File(cli.config.clone())),
        Err(BandicootError::Config(ConfigError::FileNotFound { .. }))
            if cli.uses_default_config() =>
        {
            (BandicootConfig::default(), ConfigSource::Defaults)
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to load config {}: {}",
                cli.config.display(),
                e
            ));
        }
    };

    config
        .apply_env_overrides()
        .map_err(|e| anyhow::anyhow!("invalid environment override: {}", e))?;
    apply_cli_overrides(&mut config, cli);

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    Ok((config, source))
}

/// Apply command-line overrides (highest precedence).
pub fn apply_cli_overrides(config: &mut BandicootConfig, cli: &DaemonCli) {
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if cli.dry_run {
        config.firewall.backend = "dry-run".to_owned();
    }
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: BandicootConfig,
    watcher: FirewallWatcher<BollardDockerClient>,
    start_time: Instant,
}

impl Orchestrator {
    /// Build the orchestrator from a loaded configuration.
    ///
    /// Installs the metrics recorder (if enabled), creates the Docker client,
    /// and builds the watcher with the configured gateway. The Docker socket
    /// is not touched here; an unreachable daemon shows up as degraded health
    /// once the watcher runs. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the metrics endpoint cannot
    /// be installed.
    pub fn build(config: BandicootConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let sync_config = SyncConfig::from_core(&config)
            .map_err(|e| anyhow::anyhow!("invalid sync configuration: {}", e))?;

        let docker = Arc::new(BollardDockerClient::new(sync_config.docker_socket.clone()));
        let gateway = Arc::new(ConfiguredGateway::from_config(&sync_config));

        tracing::info!(
            docker_socket = %sync_config.docker_socket,
            backend = gateway.name(),
            table = %sync_config.table,
            label_key = %sync_config.label_key,
            workers = sync_config.worker_pool_size,
            queue_capacity = sync_config.queue_capacity,
            "orchestrator initialized"
        );

        let watcher = FirewallWatcherBuilder::new()
            .config(sync_config)
            .docker_client(docker)
            .gateway(gateway)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build firewall watcher: {}", e))?;

        Ok(Self {
            config,
            watcher,
            start_time: Instant::now(),
        })
    }

    /// Start the watcher and block until SIGTERM or SIGINT, then stop it.
    pub async fn run(&mut self) -> Result<()> {
        run_until(&mut self.watcher, wait_for_shutdown_signal()).await
    }

    /// Current health of the watcher.
    pub async fn health(&self) -> HealthStatus {
        self.watcher.health_check().await
    }

    /// Seconds since the orchestrator was built.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &BandicootConfig {
        &self.config
    }
}

/// Start `pipeline`, wait for `shutdown`, then stop it.
///
/// Health is checked every [`HEALTH_CHECK_INTERVAL`] while waiting; transitions
/// away from healthy are logged. A failure to install signal handlers still
/// stops the pipeline before the error is returned.
pub async fn run_until<P, F>(pipeline: &mut P, shutdown: F) -> Result<()>
where
    P: Pipeline,
    F: Future<Output = Result<&'static str>>,
{
    pipeline
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start firewall watcher: {}", e))?;
    tracing::info!("bandicoot-daemon running");

    let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    tokio::pin!(shutdown);
    let mut last_healthy = true;
    let signal = loop {
        tokio::select! {
            signal = &mut shutdown => break signal,
            _ = interval.tick() => {
                let status = pipeline.health_check().await;
                log_health(&status, &mut last_healthy);
            }
        }
    };

    match &signal {
        Ok(name) => tracing::info!(signal = *name, "shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
    }

    pipeline
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("failed to stop firewall watcher: {}", e))?;

    signal.map(|_| ())
}

fn log_health(status: &HealthStatus, last_healthy: &mut bool) {
    match status {
        HealthStatus::Healthy => {
            if !*last_healthy {
                tracing::info!("firewall watcher healthy again");
            }
            *last_healthy = true;
        }
        HealthStatus::Degraded(reason) => {
            tracing::warn!(reason = %reason, "firewall watcher degraded");
            *last_healthy = false;
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(reason = %reason, "firewall watcher unhealthy");
            *last_healthy = false;
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Human-readable label for a config source.
pub fn describe_source(source: &ConfigSource) -> String {
    match source {
        ConfigSource::File(path) => path.display().to_string(),
        ConfigSource::Defaults => "built-in defaults".to_owned(),
    }
}
