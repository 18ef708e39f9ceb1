//! 방화벽 동기화 에러 타입
//!
//! [`SyncError`]는 이벤트 디스패치, Docker 조회, 정책 컴파일, 방화벽 적용 중
//! 발생하는 모든 에러를 표현합니다. `From<SyncError> for BandicootError` 변환이
//! 구현되어 있어 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use std::time::Duration;

use bandicoot_core::error::{
    BandicootError, ConfigError, DispatchError, FirewallError, PipelineError,
};
use bandicoot_policy::CompileError;

/// 방화벽 동기화 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 워커 슬롯 획득 타임아웃 (디스패치 루프의 재시도 신호)
    #[error("no worker slot became free within {waited:?}")]
    AcquireTimeout {
        /// 대기한 시간
        waited: Duration,
    },

    /// 재시도 한도를 넘겨 이벤트를 폐기함
    #[error("event {event_id} dropped after {attempts} slot acquisition attempt(s)")]
    PoolExhausted {
        /// 폐기된 이벤트 ID
        event_id: String,
        /// 시도 횟수
        attempts: u32,
    },

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 외부 호출 타임아웃
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// 타임아웃된 작업명
        operation: String,
        /// 적용된 타임아웃
        after: Duration,
    },

    /// 정책 컴파일 실패
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// 방화벽 디렉티브 적용 실패
    #[error("firewall error on chain '{chain}': {reason}")]
    Firewall {
        /// 대상 체인
        chain: String,
        /// 실패 사유
        reason: String,
    },

    /// 핸들러 실패
    #[error("handler '{handler}' failed: {reason}")]
    Handler {
        /// 핸들러 이름
        handler: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<SyncError> for BandicootError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AcquireTimeout { waited } => {
                BandicootError::Dispatch(DispatchError::AcquireTimeout(waited))
            }
            SyncError::PoolExhausted { .. } => {
                BandicootError::Dispatch(DispatchError::PoolExhausted(err.to_string()))
            }
            SyncError::DockerApi(_)
            | SyncError::DockerConnection(_)
            | SyncError::ContainerNotFound(_) => {
                BandicootError::Dispatch(DispatchError::Source(err.to_string()))
            }
            SyncError::Handler { .. } => {
                BandicootError::Dispatch(DispatchError::Handler(err.to_string()))
            }
            SyncError::Timeout { after, .. } => {
                BandicootError::Firewall(FirewallError::Timeout(after))
            }
            SyncError::Compile(compile) => compile.into(),
            SyncError::Firewall { chain, reason } => {
                BandicootError::Firewall(FirewallError::CommandFailed { chain, reason })
            }
            SyncError::Config { field, reason } => {
                BandicootError::Config(ConfigError::InvalidValue { field, reason })
            }
            SyncError::Channel(msg) => BandicootError::Pipeline(PipelineError::Channel(msg)),
        }
    }
}
