//! 컨테이너 생명주기 이벤트
//!
//! [`LifecycleEvent`]는 이벤트 소스(Docker 이벤트 API)에서 생성되어
//! 디스패처가 정확히 한 번 소비하는 불변 메시지입니다.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Docker가 컨테이너 시작 시 보내는 액션명
pub const ACTION_START: &str = "start";
/// Docker가 컨테이너 종료 시 보내는 액션명
pub const ACTION_DIE: &str = "die";

/// 컨테이너 생명주기 상태
///
/// `Started`와 `Died`만 방화벽 동기화 대상이며,
/// 그 외 상태는 `Other`로 보존되어 명시적으로 무시됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// 컨테이너 시작됨 (`start`)
    Started,
    /// 컨테이너 종료됨 (`die`)
    Died,
    /// 처리 대상이 아닌 상태
    Other(String),
}

impl EventStatus {
    /// Docker 이벤트의 액션 문자열을 상태로 변환합니다.
    pub fn from_action(action: &str) -> Self {
        match action {
            ACTION_START => Self::Started,
            ACTION_DIE => Self::Died,
            other => Self::Other(other.to_owned()),
        }
    }

    /// 원래의 액션 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => ACTION_START,
            Self::Died => ACTION_DIE,
            Self::Other(action) => action,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컨테이너 생명주기 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// 이벤트 고유 ID (로그 상관관계용 UUID v4)
    pub event_id: String,
    /// 대상 컨테이너 ID
    pub subject_id: String,
    /// 생명주기 상태
    pub status: EventStatus,
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
}

impl LifecycleEvent {
    /// 현재 시각으로 이벤트를 생성합니다.
    pub fn new(subject_id: impl Into<String>, status: EventStatus) -> Self {
        Self::at(subject_id, status, SystemTime::now())
    }

    /// 지정한 발생 시각으로 이벤트를 생성합니다.
    pub fn at(subject_id: impl Into<String>, status: EventStatus, timestamp: SystemTime) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            status,
            timestamp,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        write!(
            f,
            "LifecycleEvent[{}] container={} status={} at={}",
            &self.event_id[..8.min(self.event_id.len())],
            &self.subject_id[..12.min(self.subject_id.len())],
            self.status,
            secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_from_docker_actions() {
        assert_eq!(EventStatus::from_action("start"), EventStatus::Started);
        assert_eq!(EventStatus::from_action("die"), EventStatus::Died);
        assert_eq!(
            EventStatus::from_action("pause"),
            EventStatus::Other("pause".to_owned())
        );
    }

    #[test]
    fn status_matching_is_case_sensitive() {
        assert_eq!(
            EventStatus::from_action("START"),
            EventStatus::Other("START".to_owned())
        );
    }

    #[test]
    fn status_display_round_trips_action() {
        for action in ["start", "die", "oom"] {
            assert_eq!(EventStatus::from_action(action).to_string(), action);
        }
    }

    #[test]
    fn events_get_unique_ids() {
        let a = LifecycleEvent::new("abc123", EventStatus::Started);
        let b = LifecycleEvent::new("abc123", EventStatus::Started);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn display_truncates_long_ids() {
        let id = "a".repeat(64);
        let event = LifecycleEvent::at(
            id,
            EventStatus::Died,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        );
        let display = event.to_string();
        assert!(display.contains("container=aaaaaaaaaaaa "));
        assert!(display.contains("status=die"));
        assert!(display.contains("at=1700000000"));
    }

    #[test]
    fn lifecycle_event_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<LifecycleEvent>();
    }
}
