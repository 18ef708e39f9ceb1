//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트는 자체 에러 타입을 가지며 `From` 변환을 통해
//! [`BandicootError`]로 합쳐집니다.

use std::time::Duration;

/// Bandicoot 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BandicootError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 정책 컴파일 에러
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// 이벤트 디스패치 에러
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// 방화벽 적용 에러
    #[error("firewall error: {0}")]
    Firewall(#[from] FirewallError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 채널 통신 실패
    #[error("channel error: {0}")]
    Channel(String),
}

/// 정책 컴파일 에러
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Started/Died 이외의 상태
    #[error("unsupported status: {0}")]
    UnsupportedStatus(String),

    /// 정책 문서 파싱 실패
    #[error("malformed policy: {0}")]
    Malformed(String),

    /// 규칙 옵션 누락 또는 타입 불일치
    #[error("invalid rule options: {0}")]
    InvalidRuleOptions(String),
}

/// 이벤트 디스패치 에러
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// 워커 슬롯 획득 타임아웃
    #[error("timed out after {0:?} waiting for a worker slot")]
    AcquireTimeout(Duration),

    /// 재시도 한도 초과로 이벤트 폐기
    #[error("worker pool exhausted: {0}")]
    PoolExhausted(String),

    /// 핸들러 실패
    #[error("handler failed: {0}")]
    Handler(String),

    /// 이벤트 소스 에러 (Docker 등)
    #[error("event source error: {0}")]
    Source(String),
}

/// 방화벽 적용 에러
#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    /// 명령 실행 실패
    #[error("command failed on chain '{chain}': {reason}")]
    CommandFailed { chain: String, reason: String },

    /// 적용 타임아웃
    #[error("firewall call timed out after {0:?}")]
    Timeout(Duration),
}
