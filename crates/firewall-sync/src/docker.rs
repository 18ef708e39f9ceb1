//! Docker API abstraction for testability.
//!
//! Two traits split the Docker surface the watcher needs:
//!
//! - [`DockerClient`]: fresh metadata lookups (`inspect_container`) and liveness (`ping`)
//! - [`EventSource`]: the lifecycle event subscription
//!
//! [`BollardDockerClient`] implements both against the Docker daemon; tests use
//! `MockDockerClient`.
//!
//! ```text
//!   FirewallWatcher ──events()──┐        FirewallSyncHandler ──inspect_container()──┐
//!                               ▼                                                   ▼
//!                        ┌─────────────┐                                   ┌──────────────┐
//!                        │ EventSource │                                   │ DockerClient │
//!                        └──────┬──────┘                                   └──────┬───────┘
//!                               └──────────────── BollardDockerClient ────────────┘
//!                                                        │
//!                                                  Docker Daemon
//! ```
//!
//! # Container ID Validation
//!
//! `inspect_container` validates IDs before calling the API:
//! - Must be 1-64 characters
//! - Must contain only ASCII hex digits ([0-9a-fA-F])

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use futures::stream::BoxStream;

use bandicoot_core::event::{ACTION_DIE, ACTION_START, EventStatus, LifecycleEvent};
use bandicoot_core::types::ContainerMetadata;

use crate::error::SyncError;

/// Validates a container ID to prevent injection attacks.
///
/// Docker container IDs are 64-character hex strings (or shorter prefix forms).
pub fn validate_container_id(id: &str) -> Result<(), SyncError> {
    if id.is_empty() || id.len() > 64 {
        return Err(SyncError::DockerApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SyncError::DockerApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting the Docker metadata lookups.
///
/// # Error Handling
///
/// - **Invalid IDs**: `SyncError::DockerApi`
/// - **404 errors**: `SyncError::ContainerNotFound`
/// - **Connection errors**: `SyncError::DockerConnection`
pub trait DockerClient: Send + Sync + 'static {
    /// Inspects a container and returns its current labels.
    ///
    /// Called on every event; the result is never cached because the policy label
    /// must reflect the container's configuration at the time of the event.
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerMetadata, SyncError>> + Send;

    /// Checks Docker daemon connectivity.
    ///
    /// Used by the watcher's `health_check()` to report degraded mode.
    fn ping(&self) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Lifecycle event subscription.
///
/// Each call to [`events`](Self::events) opens a new subscription; dropping the
/// stream unsubscribes.
pub trait EventSource: Send + Sync + 'static {
    /// Subscribes to container `start` and `die` events.
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, SyncError>>;
}

/// Production Docker client implementation using `bollard`.
///
/// The connection is opened on first use and then shared. A socket that does
/// not exist yet surfaces as `SyncError::DockerConnection` from each call
/// instead of failing construction, so the watcher can start degraded and
/// pick Docker up once it appears.
pub struct BollardDockerClient {
    socket_path: String,
    docker: OnceLock<Arc<bollard::Docker>>,
}

/// Connection timeout passed to bollard (seconds)
const CONNECT_TIMEOUT_SECS: u64 = 120;

impl BollardDockerClient {
    /// Creates a client for the Docker socket at `socket_path`.
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            docker: OnceLock::new(),
        }
    }

    /// The configured socket path.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    fn docker(&self) -> Result<Arc<bollard::Docker>, SyncError> {
        if let Some(docker) = self.docker.get() {
            return Ok(Arc::clone(docker));
        }

        let docker = bollard::Docker::connect_with_socket(
            &self.socket_path,
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            SyncError::DockerConnection(format!(
                "failed to connect to docker at {}: {e}",
                self.socket_path
            ))
        })?;
        Ok(Arc::clone(self.docker.get_or_init(|| Arc::new(docker))))
    }
}

impl DockerClient for BollardDockerClient {
    async fn inspect_container(&self, id: &str) -> Result<ContainerMetadata, SyncError> {
        validate_container_id(id)?;

        let details = self
            .docker()?
            .inspect_container(id, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => SyncError::ContainerNotFound(id.to_owned()),
                other => SyncError::DockerApi(format!("inspect container failed: {other}")),
            })?;

        let container_id = details.id.unwrap_or_else(|| id.to_owned());
        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let labels = details
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();

        Ok(ContainerMetadata {
            id: container_id,
            name,
            labels,
        })
    }

    async fn ping(&self) -> Result<(), SyncError> {
        self.docker()?
            .ping()
            .await
            .map_err(|e| SyncError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

impl EventSource for BollardDockerClient {
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, SyncError>> {
        use bollard::system::EventsOptions;

        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), vec!["container".to_owned()]);
        filters.insert(
            "event".to_owned(),
            vec![ACTION_START.to_owned(), ACTION_DIE.to_owned()],
        );

        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let docker = match self.docker() {
            Ok(docker) => docker,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };

        docker
            .events(Some(options))
            .map(|message| match message {
                Ok(msg) => lifecycle_event_from_message(msg),
                Err(e) => Err(SyncError::DockerConnection(format!(
                    "event stream error: {e}"
                ))),
            })
            .boxed()
    }
}

/// Docker 이벤트 메시지를 생명주기 이벤트로 변환합니다.
fn lifecycle_event_from_message(
    msg: bollard::models::EventMessage,
) -> Result<LifecycleEvent, SyncError> {
    let action = msg
        .action
        .ok_or_else(|| SyncError::DockerApi("event without action".to_owned()))?;
    let subject_id = msg
        .actor
        .and_then(|actor| actor.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::DockerApi(format!("'{action}' event without actor id")))?;
    let timestamp = msg
        .time
        .and_then(|secs| u64::try_from(secs).ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap_or_else(SystemTime::now);

    Ok(LifecycleEvent::at(
        subject_id,
        EventStatus::from_action(&action),
        timestamp,
    ))
}

/// 테스트용 Mock Docker 클라이언트
///
/// 컨테이너 메타데이터와 한 번 재생할 이벤트 목록을 설정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    /// inspect_container가 반환할 컨테이너
    pub containers: Vec<ContainerMetadata>,
    /// ping 실패 시뮬레이션 여부
    pub ping_fails: bool,
    events: std::sync::Mutex<Vec<LifecycleEvent>>,
}

#[cfg(test)]
impl MockDockerClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테스트용 컨테이너를 추가합니다.
    pub fn with_containers(mut self, containers: Vec<ContainerMetadata>) -> Self {
        self.containers = containers;
        self
    }

    /// 첫 구독에서 재생할 이벤트를 설정합니다.
    pub fn with_events(self, events: Vec<LifecycleEvent>) -> Self {
        if let Ok(mut queued) = self.events.lock() {
            *queued = events;
        }
        self
    }

    /// ping이 실패하도록 설정합니다.
    pub fn with_failing_ping(mut self) -> Self {
        self.ping_fails = true;
        self
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn inspect_container(&self, id: &str) -> Result<ContainerMetadata, SyncError> {
        self.containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| SyncError::ContainerNotFound(id.to_owned()))
    }

    async fn ping(&self) -> Result<(), SyncError> {
        if self.ping_fails {
            return Err(SyncError::DockerConnection("ping failed".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl EventSource for MockDockerClient {
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, SyncError>> {
        let events = self
            .events
            .lock()
            .map(|mut queued| std::mem::take(&mut *queued))
            .unwrap_or_default();
        // 재생 후에도 구독은 열린 상태로 유지
        futures::stream::iter(events.into_iter().map(Ok))
            .chain(futures::stream::pending())
            .boxed()
    }
}
