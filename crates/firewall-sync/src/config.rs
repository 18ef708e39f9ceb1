//! 방화벽 동기화 설정
//!
//! [`SyncConfig`]는 core의 [`BandicootConfig`]에서 파생되며 디스패처, Docker 조회,
//! 방화벽 백엔드가 사용하는 값을 한곳에 모읍니다.
//!
//! # 사용 예시
//! ```ignore
//! use bandicoot_core::config::BandicootConfig;
//! use bandicoot_firewall_sync::config::SyncConfig;
//!
//! let core_config = BandicootConfig::default();
//! let config = SyncConfig::from_core(&core_config)?;
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bandicoot_core::config::{BandicootConfig, DEFAULT_POLICY_LABEL};

use crate::error::SyncError;

/// 방화벽 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirewallBackend {
    /// `iptables` 실행 파일 호출
    Iptables,
    /// 규칙을 로그로만 출력
    DryRun,
}

impl FirewallBackend {
    /// 설정 문자열에서 백엔드를 찾습니다.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "iptables" => Some(Self::Iptables),
            "dry-run" => Some(Self::DryRun),
            _ => None,
        }
    }

    /// 설정 문자열 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iptables => "iptables",
            Self::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for FirewallBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 방화벽 동기화 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 컨테이너 조회 타임아웃 (초)
    pub inspect_timeout_secs: u64,
    /// 이벤트 큐 깊이
    pub queue_capacity: usize,
    /// 워커 슬롯 수
    pub worker_pool_size: usize,
    /// 슬롯 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
    /// 슬롯 획득 재시도 최대 횟수 (0 = 무제한)
    pub max_acquire_retries: u32,
    /// 종료 시 실행 중인 핸들러 대기 시간 (초)
    pub shutdown_grace_secs: u64,
    /// 정책 레이블 키
    pub label_key: String,
    /// 방화벽 백엔드
    pub backend: FirewallBackend,
    /// iptables 실행 파일 경로
    pub iptables_path: String,
    /// 대상 테이블
    pub table: String,
    /// 디렉티브 하나의 적용 타임아웃 (초)
    pub apply_timeout_secs: u64,
    /// xtables 잠금 대기 여부
    pub wait_for_lock: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_owned(),
            inspect_timeout_secs: 30,
            queue_capacity: 5,
            worker_pool_size: 5,
            acquire_timeout_secs: 180,
            max_acquire_retries: 3,
            shutdown_grace_secs: 30,
            label_key: DEFAULT_POLICY_LABEL.to_owned(),
            backend: FirewallBackend::Iptables,
            iptables_path: "/usr/sbin/iptables".to_owned(),
            table: "filter".to_owned(),
            apply_timeout_secs: 10,
            wait_for_lock: true,
        }
    }
}

/// 설정 상한값 상수
const MAX_QUEUE_CAPACITY: usize = 10_000;
const MAX_WORKER_POOL_SIZE: usize = 256;
const MAX_ACQUIRE_TIMEOUT_SECS: u64 = 3600;
const MAX_OPERATION_TIMEOUT_SECS: u64 = 600;

impl SyncConfig {
    /// core 설정에서 동기화 설정을 생성합니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 방화벽 백엔드 이름이면 `SyncError::Config`를 반환합니다.
    pub fn from_core(core: &BandicootConfig) -> Result<Self, SyncError> {
        let backend =
            FirewallBackend::from_name(&core.firewall.backend).ok_or_else(|| SyncError::Config {
                field: "backend".to_owned(),
                reason: format!("unknown backend '{}'", core.firewall.backend),
            })?;

        Ok(Self {
            docker_socket: core.docker.socket.clone(),
            inspect_timeout_secs: core.docker.inspect_timeout_secs,
            queue_capacity: core.dispatcher.queue_capacity,
            worker_pool_size: core.dispatcher.worker_pool_size,
            acquire_timeout_secs: core.dispatcher.acquire_timeout_secs,
            max_acquire_retries: core.dispatcher.max_acquire_retries,
            shutdown_grace_secs: core.dispatcher.shutdown_grace_secs,
            label_key: core.policy.label_key.clone(),
            backend,
            iptables_path: core.firewall.iptables_path.clone(),
            table: core.firewall.table.clone(),
            apply_timeout_secs: core.firewall.apply_timeout_secs,
            wait_for_lock: core.firewall.wait_for_lock,
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }

        if self.worker_pool_size == 0 || self.worker_pool_size > MAX_WORKER_POOL_SIZE {
            return Err(invalid(
                "worker_pool_size",
                format!("must be 1-{MAX_WORKER_POOL_SIZE}"),
            ));
        }

        if self.acquire_timeout_secs == 0 || self.acquire_timeout_secs > MAX_ACQUIRE_TIMEOUT_SECS {
            return Err(invalid(
                "acquire_timeout_secs",
                format!("must be 1-{MAX_ACQUIRE_TIMEOUT_SECS}"),
            ));
        }

        for (field, value) in [
            ("inspect_timeout_secs", self.inspect_timeout_secs),
            ("apply_timeout_secs", self.apply_timeout_secs),
            ("shutdown_grace_secs", self.shutdown_grace_secs),
        ] {
            if value == 0 || value > MAX_OPERATION_TIMEOUT_SECS {
                return Err(invalid(
                    field,
                    format!("must be 1-{MAX_OPERATION_TIMEOUT_SECS}"),
                ));
            }
        }

        if self.label_key.trim().is_empty() {
            return Err(invalid("label_key", "must not be empty".to_owned()));
        }

        if self.table.trim().is_empty() {
            return Err(invalid("table", "must not be empty".to_owned()));
        }

        if self.backend == FirewallBackend::Iptables && self.iptables_path.is_empty() {
            return Err(invalid(
                "iptables_path",
                "must not be empty when backend is iptables".to_owned(),
            ));
        }

        Ok(())
    }

    /// 컨테이너 조회 타임아웃
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    /// 슬롯 획득 타임아웃
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// 디렉티브 적용 타임아웃
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    /// 종료 대기 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn invalid(field: &str, reason: String) -> SyncError {
    SyncError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 동기화 설정 빌더
#[derive(Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Docker 소켓 경로를 설정합니다.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = socket.into();
        self
    }

    /// 컨테이너 조회 타임아웃(초)을 설정합니다.
    pub fn inspect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.inspect_timeout_secs = secs;
        self
    }

    /// 이벤트 큐 깊이를 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 워커 슬롯 수를 설정합니다.
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    /// 슬롯 획득 타임아웃(초)을 설정합니다.
    pub fn acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.config.acquire_timeout_secs = secs;
        self
    }

    /// 슬롯 획득 재시도 최대 횟수를 설정합니다.
    pub fn max_acquire_retries(mut self, retries: u32) -> Self {
        self.config.max_acquire_retries = retries;
        self
    }

    /// 종료 대기 시간(초)을 설정합니다.
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// 정책 레이블 키를 설정합니다.
    pub fn label_key(mut self, key: impl Into<String>) -> Self {
        self.config.label_key = key.into();
        self
    }

    /// 방화벽 백엔드를 설정합니다.
    pub fn backend(mut self, backend: FirewallBackend) -> Self {
        self.config.backend = backend;
        self
    }

    /// iptables 실행 파일 경로를 설정합니다.
    pub fn iptables_path(mut self, path: impl Into<String>) -> Self {
        self.config.iptables_path = path.into();
        self
    }

    /// 대상 테이블을 설정합니다.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    /// 디렉티브 적용 타임아웃(초)을 설정합니다.
    pub fn apply_timeout_secs(mut self, secs: u64) -> Self {
        self.config.apply_timeout_secs = secs;
        self
    }

    /// xtables 잠금 대기 여부를 설정합니다.
    pub fn wait_for_lock(mut self, wait: bool) -> Self {
        self.config.wait_for_lock = wait;
        self
    }

    /// 설정을 검증하고 `SyncConfig`를 생성합니다.
    pub fn build(self) -> Result<SyncConfig, SyncError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
