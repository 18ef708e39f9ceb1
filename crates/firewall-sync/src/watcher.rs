//! 방화벽 워처 -- 이벤트 구독, 디스패치, 종료 처리 전체 흐름 관리
//!
//! [`FirewallWatcher`]는 core의 [`Pipeline`] trait을 구현하여
//! `bandicoot-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! EventSource.events() ──feed task──> EventSubmitter ──mpsc──> Dispatcher::run
//!        ^  (스트림 종료 시 재구독)                                   |
//!        |                                                  WorkerPool 슬롯 획득
//!   Docker daemon                                                    |
//!                                                 FirewallSyncHandler (inspect → compile → apply)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bandicoot_core::error::{BandicootError, PipelineError};
use bandicoot_core::event::{EventStatus, LifecycleEvent};
use bandicoot_core::pipeline::{HealthStatus, Pipeline};

use crate::config::SyncConfig;
use crate::dispatcher::{DispatchStats, Dispatcher, EventSubmitter, dispatch_queue};
use crate::docker::{DockerClient, EventSource};
use crate::error::SyncError;
use crate::firewall::FirewallGateway;
use crate::handler::{EventHandler, HandlerTable};
use crate::pool::WorkerPool;
use crate::sync::FirewallSyncHandler;

/// 이벤트 스트림이 끊긴 뒤 재구독까지 대기 시간
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// 워처 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨 (다시 시작 가능)
    Stopped,
}

/// 방화벽 워처 -- 컨테이너 이벤트를 받아 등록된 핸들러로 디스패치합니다.
///
/// # 사용 예시
/// ```ignore
/// use bandicoot_firewall_sync::{FirewallWatcherBuilder, BollardDockerClient, ConfiguredGateway};
///
/// let mut watcher = FirewallWatcherBuilder::new()
///     .config(config.clone())
///     .docker_client(Arc::new(BollardDockerClient::new("/var/run/docker.sock")))
///     .gateway(Arc::new(ConfiguredGateway::from_config(&config)))
///     .build()?;
///
/// watcher.start().await?;
/// ```
pub struct FirewallWatcher<D: DockerClient + EventSource> {
    config: SyncConfig,
    state: WatcherState,
    docker: Arc<D>,
    handlers: Arc<HandlerTable>,
    pool: Arc<WorkerPool>,
    stats: Arc<DispatchStats>,
    submitter: Option<EventSubmitter>,
    shutdown_tx: watch::Sender<bool>,
    feed_task: Option<JoinHandle<()>>,
    dispatch_task: Option<JoinHandle<()>>,
}

impl<D: DockerClient + EventSource> FirewallWatcher<D> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            WatcherState::Initialized => "initialized",
            WatcherState::Running => "running",
            WatcherState::Stopped => "stopped",
        }
    }

    /// 디스패치 카운터
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// 등록된 핸들러 테이블
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// 현재 사용 중인 워커 슬롯 수
    pub fn busy_workers(&self) -> usize {
        self.pool.outstanding()
    }

    /// 이벤트를 직접 큐에 넣을 수 있는 송신측. 실행 중일 때만 `Some`입니다.
    pub fn submitter(&self) -> Option<EventSubmitter> {
        self.submitter.clone()
    }

    /// 워처 설정
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl<D: DockerClient + EventSource> Pipeline for FirewallWatcher<D> {
    async fn start(&mut self) -> Result<(), BandicootError> {
        if self.state == WatcherState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            workers = self.pool.capacity(),
            queue_capacity = self.config.queue_capacity,
            handlers = self.handlers.len(),
            "starting firewall watcher"
        );

        // 1. Docker 연결 확인
        if let Err(e) = self.docker.ping().await {
            warn!(error = %e, "docker daemon not available, watcher will run in degraded mode");
        }

        self.shutdown_tx.send_replace(false);

        // 2. 디스패치 루프
        let (submitter, queue) = dispatch_queue(self.config.queue_capacity);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.handlers),
            self.config.acquire_timeout(),
            self.config.max_acquire_retries,
        )
        .with_stats(Arc::clone(&self.stats));
        self.dispatch_task = Some(tokio::spawn(dispatcher.run(queue)));

        // 3. 이벤트 구독 루프
        let feed = feed_events(
            Arc::clone(&self.docker),
            submitter.clone(),
            self.shutdown_tx.subscribe(),
        );
        self.feed_task = Some(tokio::spawn(feed));

        self.submitter = Some(submitter);
        self.state = WatcherState::Running;
        info!("firewall watcher started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BandicootError> {
        if self.state != WatcherState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping firewall watcher");
        let deadline = Instant::now() + self.config.shutdown_grace();

        // 구독 중단, 송신측을 모두 닫아 디스패치 루프가 남은 이벤트를 비우고 끝나도록 함
        self.shutdown_tx.send_replace(true);
        self.submitter = None;
        if let Some(feed) = self.feed_task.take() {
            if let Err(e) = feed.await {
                warn!(error = %e, "event feed task ended abnormally");
            }
        }

        if let Some(mut dispatch) = self.dispatch_task.take() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut dispatch).await {
                Ok(Ok(())) => debug!("dispatch loop drained"),
                Ok(Err(e)) => warn!(error = %e, "dispatch loop ended abnormally"),
                Err(_) => {
                    warn!(
                        "shutdown grace period elapsed before queue drained, \
                         discarding remaining events"
                    );
                    dispatch.abort();
                }
            }
        }

        // 실행 중인 핸들러 대기
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.pool.wait_idle(remaining).await {
            warn!(
                in_flight = self.pool.outstanding(),
                "handlers still running after shutdown grace period"
            );
        }

        self.state = WatcherState::Stopped;
        info!(
            received = self.stats.received(),
            dispatched = self.stats.dispatched(),
            dropped = self.stats.dropped(),
            handler_failures = self.stats.handler_failures(),
            "firewall watcher stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            WatcherState::Running => {
                if self.docker.ping().await.is_ok() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded("docker daemon not reachable".to_owned())
                }
            }
            WatcherState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            WatcherState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 이벤트 스트림을 구독해 디스패치 큐로 전달합니다.
///
/// 스트림이 끝나면 [`RESUBSCRIBE_DELAY`] 뒤 다시 구독합니다.
async fn feed_events<D: EventSource>(
    source: Arc<D>,
    submitter: EventSubmitter,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let mut stream = source.events();
        debug!("subscribed to container lifecycle events");

        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    if !forward(&submitter, event, &mut shutdown).await {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "event stream error");
                }
                None => break,
            }
        }

        warn!(
            delay_secs = RESUBSCRIBE_DELAY.as_secs(),
            "event stream ended, resubscribing"
        );
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }
}

/// 이벤트 하나를 큐에 넣습니다. 종료 신호를 받았거나 큐가 닫혔으면 `false`.
async fn forward(
    submitter: &EventSubmitter,
    event: LifecycleEvent,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let event_id = event.event_id.clone();
    tokio::select! {
        biased;
        _ = shutdown.changed() => {
            debug!(event_id = %event_id, "shutdown requested while queue full, event discarded");
            false
        }
        sent = submitter.submit(event) => match sent {
            Ok(()) => true,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "failed to enqueue event");
                false
            }
        }
    }
}

/// 방화벽 워처 빌더
///
/// 기본 [`FirewallSyncHandler`]를 Started/Died 양쪽에 등록하고,
/// 추가 핸들러는 [`add_handler`](Self::add_handler)로 등록합니다.
pub struct FirewallWatcherBuilder<D: DockerClient + EventSource, G: FirewallGateway> {
    config: SyncConfig,
    docker: Option<Arc<D>>,
    gateway: Option<Arc<G>>,
    extra_handlers: Vec<(EventStatus, Arc<dyn EventHandler>)>,
}

impl<D: DockerClient + EventSource, G: FirewallGateway> FirewallWatcherBuilder<D, G> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            docker: None,
            gateway: None,
            extra_handlers: Vec::new(),
        }
    }

    /// 워처 설정을 지정합니다.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Docker 클라이언트를 설정합니다.
    pub fn docker_client(mut self, docker: Arc<D>) -> Self {
        self.docker = Some(docker);
        self
    }

    /// 방화벽 게이트웨이를 설정합니다.
    pub fn gateway(mut self, gateway: Arc<G>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// 기본 동기화 핸들러 뒤에 실행될 핸들러를 추가합니다.
    pub fn add_handler(mut self, status: EventStatus, handler: Arc<dyn EventHandler>) -> Self {
        self.extra_handlers.push((status, handler));
        self
    }

    /// 워처를 빌드합니다.
    ///
    /// # Errors
    ///
    /// 설정이 유효하지 않거나 Docker 클라이언트/게이트웨이가 없으면 `SyncError::Config`.
    pub fn build(self) -> Result<FirewallWatcher<D>, SyncError> {
        self.config.validate()?;

        let docker = self.docker.ok_or_else(|| SyncError::Config {
            field: "docker_client".to_owned(),
            reason: "docker client must be provided".to_owned(),
        })?;
        let gateway = self.gateway.ok_or_else(|| SyncError::Config {
            field: "gateway".to_owned(),
            reason: "firewall gateway must be provided".to_owned(),
        })?;

        let sync: Arc<dyn EventHandler> = Arc::new(FirewallSyncHandler::new(
            Arc::clone(&docker),
            gateway,
            &self.config,
        ));

        let mut handlers = HandlerTable::new();
        handlers.register(&EventStatus::Started, Arc::clone(&sync))?;
        handlers.register(&EventStatus::Died, sync)?;
        for (status, handler) in self.extra_handlers {
            handlers.register(&status, handler)?;
        }

        let pool = WorkerPool::new(self.config.worker_pool_size)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(FirewallWatcher {
            config: self.config,
            state: WatcherState::Initialized,
            docker,
            handlers: Arc::new(handlers),
            pool,
            stats: Arc::new(DispatchStats::default()),
            submitter: None,
            shutdown_tx,
            feed_task: None,
            dispatch_task: None,
        })
    }
}

impl<D: DockerClient + EventSource, G: FirewallGateway> Default for FirewallWatcherBuilder<D, G> {
    fn default() -> Self {
        Self::new()
    }
}
