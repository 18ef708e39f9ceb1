//! 설정 관리 -- bandicoot.toml 파싱 및 런타임 설정
//!
//! [`BandicootConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BANDICOOT_DISPATCHER_WORKER_POOL_SIZE=8` 형식)
//! 3. 설정 파일 (`bandicoot.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), bandicoot_core::error::BandicootError> {
//! use bandicoot_core::config::BandicootConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BandicootConfig::load("bandicoot.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BandicootConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BandicootError, ConfigError};

/// 정책 문서가 저장되는 기본 레이블 키
pub const DEFAULT_POLICY_LABEL: &str = "io.bandicoot.rules";

/// 설정 상한값 상수
const MAX_QUEUE_CAPACITY: usize = 10_000;
const MAX_WORKER_POOL_SIZE: usize = 256;
const MAX_ACQUIRE_TIMEOUT_SECS: u64 = 3600;
const MAX_ACQUIRE_RETRIES: u32 = 1000;
const MAX_OPERATION_TIMEOUT_SECS: u64 = 600;

/// Bandicoot 통합 설정
///
/// `bandicoot.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandicootConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 이벤트 디스패처 설정
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// 정책 레이블 설정
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 방화벽 백엔드 설정
    #[serde(default)]
    pub firewall: FirewallConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BandicootConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BandicootError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BandicootError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BandicootError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BandicootError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BandicootError> {
        toml::from_str(toml_str).map_err(|e| {
            BandicootError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BANDICOOT_{SECTION}_{FIELD}`
    ///
    /// # Errors
    ///
    /// 값을 해당 타입으로 해석할 수 없으면 `ConfigError::InvalidValue`를 반환합니다.
    /// 필드 이름에는 환경변수 이름이 들어갑니다.
    pub fn apply_env_overrides(&mut self) -> Result<(), BandicootError> {
        // General
        override_string(&mut self.general.log_level, "BANDICOOT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BANDICOOT_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "BANDICOOT_DOCKER_SOCKET");
        override_u64(
            &mut self.docker.inspect_timeout_secs,
            "BANDICOOT_DOCKER_INSPECT_TIMEOUT_SECS",
        )?;

        // Dispatcher
        override_usize(
            &mut self.dispatcher.queue_capacity,
            "BANDICOOT_DISPATCHER_QUEUE_CAPACITY",
        )?;
        override_usize(
            &mut self.dispatcher.worker_pool_size,
            "BANDICOOT_DISPATCHER_WORKER_POOL_SIZE",
        )?;
        override_u64(
            &mut self.dispatcher.acquire_timeout_secs,
            "BANDICOOT_DISPATCHER_ACQUIRE_TIMEOUT_SECS",
        )?;
        override_u32(
            &mut self.dispatcher.max_acquire_retries,
            "BANDICOOT_DISPATCHER_MAX_ACQUIRE_RETRIES",
        )?;
        override_u64(
            &mut self.dispatcher.shutdown_grace_secs,
            "BANDICOOT_DISPATCHER_SHUTDOWN_GRACE_SECS",
        )?;

        // Policy
        override_string(&mut self.policy.label_key, "BANDICOOT_POLICY_LABEL_KEY");

        // Firewall
        override_string(&mut self.firewall.backend, "BANDICOOT_FIREWALL_BACKEND");
        override_string(
            &mut self.firewall.iptables_path,
            "BANDICOOT_FIREWALL_IPTABLES_PATH",
        );
        override_string(&mut self.firewall.table, "BANDICOOT_FIREWALL_TABLE");
        override_u64(
            &mut self.firewall.apply_timeout_secs,
            "BANDICOOT_FIREWALL_APPLY_TIMEOUT_SECS",
        )?;
        override_bool(
            &mut self.firewall.wait_for_lock,
            "BANDICOOT_FIREWALL_WAIT_FOR_LOCK",
        )?;

        // Metrics
        override_bool(&mut self.metrics.enabled, "BANDICOOT_METRICS_ENABLED")?;
        override_string(
            &mut self.metrics.listen_addr,
            "BANDICOOT_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "BANDICOOT_METRICS_PORT")?;

        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BandicootError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.docker.socket.is_empty() {
            return Err(invalid("docker.socket", "must not be empty".to_owned()));
        }

        check_timeout("docker.inspect_timeout_secs", self.docker.inspect_timeout_secs)?;

        let dispatcher = &self.dispatcher;
        if dispatcher.queue_capacity == 0 || dispatcher.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "dispatcher.queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }
        if dispatcher.worker_pool_size == 0 || dispatcher.worker_pool_size > MAX_WORKER_POOL_SIZE
        {
            return Err(invalid(
                "dispatcher.worker_pool_size",
                format!("must be 1-{MAX_WORKER_POOL_SIZE}"),
            ));
        }
        if dispatcher.acquire_timeout_secs == 0
            || dispatcher.acquire_timeout_secs > MAX_ACQUIRE_TIMEOUT_SECS
        {
            return Err(invalid(
                "dispatcher.acquire_timeout_secs",
                format!("must be 1-{MAX_ACQUIRE_TIMEOUT_SECS}"),
            ));
        }
        if dispatcher.max_acquire_retries > MAX_ACQUIRE_RETRIES {
            return Err(invalid(
                "dispatcher.max_acquire_retries",
                format!("must be 0-{MAX_ACQUIRE_RETRIES} (0 = unbounded)"),
            ));
        }
        check_timeout(
            "dispatcher.shutdown_grace_secs",
            dispatcher.shutdown_grace_secs,
        )?;

        if self.policy.label_key.trim().is_empty() {
            return Err(invalid("policy.label_key", "must not be empty".to_owned()));
        }

        let valid_backends = ["iptables", "dry-run"];
        if !valid_backends.contains(&self.firewall.backend.as_str()) {
            return Err(invalid(
                "firewall.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }
        if self.firewall.backend == "iptables" && self.firewall.iptables_path.is_empty() {
            return Err(invalid(
                "firewall.iptables_path",
                "must not be empty when backend is iptables".to_owned(),
            ));
        }
        if self.firewall.table.is_empty() {
            return Err(invalid("firewall.table", "must not be empty".to_owned()));
        }
        check_timeout("firewall.apply_timeout_secs", self.firewall.apply_timeout_secs)?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> BandicootError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn check_timeout(field: &str, secs: u64) -> Result<(), BandicootError> {
    if secs == 0 || secs > MAX_OPERATION_TIMEOUT_SECS {
        return Err(invalid(
            field,
            format!("must be 1-{MAX_OPERATION_TIMEOUT_SECS}"),
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로
    pub socket: String,
    /// 컨테이너 조회 타임아웃 (초)
    pub inspect_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_owned(),
            inspect_timeout_secs: 30,
        }
    }
}

/// 이벤트 디스패처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 이벤트 큐 깊이 (가득 차면 이벤트 소스가 대기)
    pub queue_capacity: usize,
    /// 동시에 실행되는 핸들러 최대 수
    pub worker_pool_size: usize,
    /// 워커 슬롯 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
    /// 슬롯 획득 재시도 최대 횟수 (0 = 무제한)
    pub max_acquire_retries: u32,
    /// 종료 시 실행 중인 핸들러를 기다리는 최대 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            worker_pool_size: 5,
            acquire_timeout_secs: 180,
            max_acquire_retries: 3,
            shutdown_grace_secs: 30,
        }
    }
}

/// 정책 레이블 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 정책 문서를 담는 컨테이너 레이블 키
    pub label_key: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_POLICY_LABEL.to_owned(),
        }
    }
}

/// 방화벽 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// 백엔드 (iptables, dry-run)
    pub backend: String,
    /// iptables 실행 파일 경로
    pub iptables_path: String,
    /// 대상 테이블
    pub table: String,
    /// 규칙 하나를 적용하는 타임아웃 (초)
    pub apply_timeout_secs: u64,
    /// xtables 잠금 대기 (`-w`)
    pub wait_for_lock: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            backend: "iptables".to_owned(),
            iptables_path: "/usr/sbin/iptables".to_owned(),
            table: "filter".to_owned(),
            apply_timeout_secs: 10,
            wait_for_lock: true,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(
    target: &mut T,
    env_key: &str,
    type_name: &str,
) -> Result<(), BandicootError> {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.parse::<T>().map_err(|_| {
            invalid(env_key, format!("expected {type_name}, got '{val}'"))
        })?;
    }
    Ok(())
}

fn override_bool(target: &mut bool, env_key: &str) -> Result<(), BandicootError> {
    override_parsed(target, env_key, "bool")
}

fn override_usize(target: &mut usize, env_key: &str) -> Result<(), BandicootError> {
    override_parsed(target, env_key, "usize")
}

fn override_u16(target: &mut u16, env_key: &str) -> Result<(), BandicootError> {
    override_parsed(target, env_key, "u16")
}

fn override_u32(target: &mut u32, env_key: &str) -> Result<(), BandicootError> {
    override_parsed(target, env_key, "u32")
}

fn override_u64(target: &mut u64, env_key: &str) -> Result<(), BandicootError> {
    override_parsed(target, env_key, "u64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = BandicootConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.dispatcher.queue_capacity, 5);
        assert_eq!(config.dispatcher.worker_pool_size, 5);
        assert_eq!(config.dispatcher.acquire_timeout_secs, 180);
        assert_eq!(config.policy.label_key, "io.bandicoot.rules");
        assert_eq!(config.firewall.table, "filter");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        BandicootConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = BandicootConfig::parse("").unwrap();
        assert_eq!(config.docker.socket, "/var/run/docker.sock");
        assert_eq!(config.firewall.backend, "iptables");
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let toml = r#"
[dispatcher]
worker_pool_size = 16

[firewall]
backend = "dry-run"
"#;
        let config = BandicootConfig::parse(toml).unwrap();
        assert_eq!(config.dispatcher.worker_pool_size, 16);
        assert_eq!(config.dispatcher.queue_capacity, 5);
        assert_eq!(config.firewall.backend, "dry-run");
        assert_eq!(config.firewall.table, "filter");
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = BandicootConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            BandicootError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = BandicootConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_zero_pool_size() {
        let mut config = BandicootConfig::default();
        config.dispatcher.worker_pool_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_pool_size"));
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = BandicootConfig::default();
        config.dispatcher.queue_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn validate_accepts_unbounded_retries() {
        let mut config = BandicootConfig::default();
        config.dispatcher.max_acquire_retries = 0;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_backend() {
        let mut config = BandicootConfig::default();
        config.firewall.backend = "nftables".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("firewall.backend"));
    }

    #[test]
    fn validate_allows_empty_iptables_path_for_dry_run() {
        let mut config = BandicootConfig::default();
        config.firewall.backend = "dry-run".to_owned();
        config.firewall.iptables_path = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_blank_label_key() {
        let mut config = BandicootConfig::default();
        config.policy.label_key = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("label_key"));
    }

    #[test]
    fn validate_rejects_zero_apply_timeout() {
        let mut config = BandicootConfig::default();
        config.firewall.apply_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("apply_timeout_secs"));
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: #[serial]로 환경변수를 조작하는 테스트가 동시에 실행되지 않습니다.
        unsafe { std::env::set_var("TEST_BANDICOOT_STR", "overridden") };
        override_string(&mut val, "TEST_BANDICOOT_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_BANDICOOT_STR") };
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_is_rejected() {
        let mut val = 5usize;
        // SAFETY: #[serial]로 환경변수를 조작하는 테스트가 동시에 실행되지 않습니다.
        unsafe { std::env::set_var("TEST_BANDICOOT_USIZE_BAD", "five") };
        let result = override_usize(&mut val, "TEST_BANDICOOT_USIZE_BAD");
        unsafe { std::env::remove_var("TEST_BANDICOOT_USIZE_BAD") };

        let err = result.unwrap_err();
        assert!(err.to_string().contains("TEST_BANDICOOT_USIZE_BAD"), "{err}");
        assert!(err.to_string().contains("five"), "{err}");
        assert_eq!(val, 5);
    }

    #[test]
    #[serial]
    fn env_override_rejects_bad_section_value() {
        let mut config = BandicootConfig::default();
        // SAFETY: #[serial]로 환경변수를 조작하는 테스트가 동시에 실행되지 않습니다.
        unsafe { std::env::set_var("BANDICOOT_METRICS_PORT", "70000") };
        let result = config.apply_env_overrides();
        unsafe { std::env::remove_var("BANDICOOT_METRICS_PORT") };

        let err = result.unwrap_err();
        assert!(err.to_string().contains("BANDICOOT_METRICS_PORT"), "{err}");
        assert_eq!(config.metrics.port, 9108);
    }

    #[test]
    #[serial]
    fn env_override_applies_to_sections() {
        let mut config = BandicootConfig::default();
        // SAFETY: #[serial]로 환경변수를 조작하는 테스트가 동시에 실행되지 않습니다.
        unsafe {
            std::env::set_var("BANDICOOT_DISPATCHER_WORKER_POOL_SIZE", "12");
            std::env::set_var("BANDICOOT_FIREWALL_WAIT_FOR_LOCK", "false");
        }
        let result = config.apply_env_overrides();
        unsafe {
            std::env::remove_var("BANDICOOT_DISPATCHER_WORKER_POOL_SIZE");
            std::env::remove_var("BANDICOOT_FIREWALL_WAIT_FOR_LOCK");
        }
        result.unwrap();
        assert_eq!(config.dispatcher.worker_pool_size, 12);
        assert!(!config.firewall.wait_for_lock);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = BandicootConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = BandicootConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(
            config.dispatcher.acquire_timeout_secs,
            parsed.dispatcher.acquire_timeout_secs
        );
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = BandicootConfig::from_file("/nonexistent/path/bandicoot.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BandicootError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
