//! Configuration loading tests.
//!
//! Covers file/default fallback, environment and CLI override precedence,
//! and validation of the merged result.

use std::io::Write;
use std::path::Path;

use bandicoot_daemon::cli::{DEFAULT_CONFIG_PATH, DaemonCli};
use bandicoot_daemon::orchestrator::{ConfigSource, Orchestrator, load_config};
use clap::Parser;
use serial_test::serial;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

fn cli(args: &[&str]) -> DaemonCli {
    let mut argv = vec!["bandicoot-daemon"];
    argv.extend_from_slice(args);
    DaemonCli::parse_from(argv)
}

#[tokio::test]
#[serial]
async fn loads_file_and_reports_source() {
    let file = write_config(
        r#"
[dispatcher]
worker_pool_size = 8

[firewall]
table = "mangle"
"#,
    );
    let path = file.path().to_str().expect("utf-8 path");

    let (config, source) = load_config(&cli(&["--config", path])).await.unwrap();

    assert_eq!(config.dispatcher.worker_pool_size, 8);
    assert_eq!(config.firewall.table, "mangle");
    assert_eq!(config.dispatcher.queue_capacity, 5);
    assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
}

#[tokio::test]
#[serial]
async fn explicit_missing_file_is_an_error() {
    let err = load_config(&cli(&["--config", "/nonexistent/bandicoot/custom.toml"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("custom.toml"));
}

#[tokio::test]
#[serial]
async fn missing_default_file_falls_back_to_defaults() {
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return;
    }

    let (config, source) = load_config(&cli(&[])).await.unwrap();
    assert_eq!(source, ConfigSource::Defaults);
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.firewall.backend, "iptables");
}

#[tokio::test]
#[serial]
async fn cli_beats_env_beats_file() {
    let file = write_config("[general]\nlog_level = \"debug\"\nlog_format = \"pretty\"\n");
    let path = file.path().to_str().expect("utf-8 path");

    unsafe { std::env::set_var("BANDICOOT_GENERAL_LOG_LEVEL", "warn") };
    let from_env = load_config(&cli(&["--config", path])).await;
    let from_cli = load_config(&cli(&["--config", path, "--log-level", "error"])).await;
    unsafe { std::env::remove_var("BANDICOOT_GENERAL_LOG_LEVEL") };

    let (config, _) = from_env.unwrap();
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.general.log_format, "pretty");

    let (config, _) = from_cli.unwrap();
    assert_eq!(config.general.log_level, "error");
}

#[tokio::test]
#[serial]
async fn unparsable_env_override_is_an_error() {
    let file = write_config("[dispatcher]\nworker_pool_size = 4\n");
    let path = file.path().to_str().expect("utf-8 path");

    unsafe { std::env::set_var("BANDICOOT_DISPATCHER_WORKER_POOL_SIZE", "abc") };
    let result = load_config(&cli(&["--config", path, "--validate"])).await;
    unsafe { std::env::remove_var("BANDICOOT_DISPATCHER_WORKER_POOL_SIZE") };

    let err = result.unwrap_err().to_string();
    assert!(err.contains("BANDICOOT_DISPATCHER_WORKER_POOL_SIZE"), "{err}");
    assert!(err.contains("abc"), "{err}");
}

#[tokio::test]
#[serial]
async fn dry_run_flag_selects_dry_run_backend() {
    let file = write_config("[firewall]\nbackend = \"iptables\"\n");
    let path = file.path().to_str().expect("utf-8 path");

    let (config, _) = load_config(&cli(&["--config", path, "--dry-run"]))
        .await
        .unwrap();
    assert_eq!(config.firewall.backend, "dry-run");
}

#[tokio::test]
#[serial]
async fn invalid_values_fail_validation() {
    let file = write_config("[dispatcher]\nworker_pool_size = 0\n");
    let path = file.path().to_str().expect("utf-8 path");

    let err = load_config(&cli(&["--config", path])).await.unwrap_err();
    assert!(err.to_string().contains("worker_pool_size"), "{err}");
}

#[tokio::test]
#[serial]
async fn invalid_cli_override_fails_validation() {
    let file = write_config("");
    let path = file.path().to_str().expect("utf-8 path");

    let err = load_config(&cli(&["--config", path, "--log-format", "xml"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("log_format"), "{err}");
}

#[tokio::test]
#[serial]
async fn unparseable_file_is_an_error() {
    let file = write_config("[dispatcher\nworker_pool_size = ");
    let path = file.path().to_str().expect("utf-8 path");

    assert!(load_config(&cli(&["--config", path])).await.is_err());
}

#[tokio::test]
async fn orchestrator_rejects_invalid_config() {
    let mut config = bandicoot_core::config::BandicootConfig::default();
    config.firewall.backend = "nftables".to_owned();

    let err = Orchestrator::build(config).err().expect("build must fail");
    assert!(err.to_string().contains("firewall.backend"), "{err}");
}

#[tokio::test]
async fn orchestrator_builds_without_docker_socket() {
    let mut config = bandicoot_core::config::BandicootConfig::default();
    config.docker.socket = "/nonexistent/bandicoot/docker.sock".to_owned();
    config.firewall.backend = "dry-run".to_owned();

    let orchestrator = Orchestrator::build(config).expect("build must not touch the socket");
    assert_eq!(
        orchestrator.config().docker.socket,
        "/nonexistent/bandicoot/docker.sock"
    );
}
