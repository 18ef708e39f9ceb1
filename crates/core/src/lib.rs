//! Bandicoot 공통 크레이트
//!
//! 컨테이너 생명주기와 호스트 방화벽 상태를 동기화하는 모든 크레이트가
//! 공유하는 타입, 에러, 설정, 파이프라인 trait, 메트릭 이름을 정의합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 최상위 에러 (`BandicootError`) 및 도메인 에러
//! - [`config`]: `bandicoot.toml` 파싱 및 환경변수 오버라이드
//! - [`event`]: 컨테이너 생명주기 이벤트 (`LifecycleEvent`, `EventStatus`)
//! - [`types`]: 컨테이너 메타데이터 (`ContainerMetadata`)
//! - [`pipeline`]: 생명주기 trait (`Pipeline`, `HealthStatus`)
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    BandicootError, ConfigError, DispatchError, FirewallError, PipelineError, PolicyError,
};

// 설정
pub use config::BandicootConfig;

// 이벤트
pub use event::{EventStatus, LifecycleEvent};

// 파이프라인 trait
pub use pipeline::{BoxFuture, HealthStatus, Pipeline};

// 도메인 타입
pub use types::ContainerMetadata;
