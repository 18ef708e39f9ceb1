//! 이벤트 디스패처 -- 순차 소비 루프 + 슬롯 단위 비동기 핸들러 실행
//!
//! # 흐름
//! ```text
//! EventSubmitter ──bounded mpsc──> Dispatcher::run (단일 루프, FIFO)
//!                                       |
//!                              handlers_for(status) ── None ──> ignored
//!                                       |
//!                              WorkerPool::acquire(timeout)
//!                                 |  timeout → warn + 재시도 (한도 초과 시 폐기)
//!                                 v
//!                         tokio::spawn(핸들러 전부 실행, 슬롯 반환)
//! ```
//!
//! 큐가 가득 차면 `submit`이 대기하며, 이것이 이벤트 소스 방향의 유일한 배압 지점입니다.
//! 풀이 고갈되면 루프가 다음 이벤트로 넘어가지 않으므로 배압이 큐를 통해 전달됩니다.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bandicoot_core::event::LifecycleEvent;
use bandicoot_core::metrics as m;

use crate::error::SyncError;
use crate::handler::{EventHandler, HandlerTable};
use crate::pool::{SlotGuard, WorkerPool};

/// 이벤트 큐 생성: 송신측 [`EventSubmitter`]와 디스패처가 소비할 수신측
pub fn dispatch_queue(capacity: usize) -> (EventSubmitter, mpsc::Receiver<LifecycleEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSubmitter { tx }, rx)
}

/// 디스패치 큐 송신측
#[derive(Debug, Clone)]
pub struct EventSubmitter {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventSubmitter {
    /// 이벤트를 큐에 넣습니다. 큐가 가득 차 있으면 자리가 날 때까지 대기합니다.
    pub async fn submit(&self, event: LifecycleEvent) -> Result<(), SyncError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SyncError::Channel("dispatch queue closed".to_owned()))
    }

    /// 디스패처가 종료되어 큐가 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 디스패치 카운터
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    ignored: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    acquire_timeouts: AtomicU64,
    handler_failures: AtomicU64,
}

impl DispatchStats {
    /// 큐에서 꺼낸 이벤트 수
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// 핸들러가 없어 무시된 이벤트 수
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// 워커에 넘겨진 이벤트 수
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// 재시도 한도 초과로 폐기된 이벤트 수
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 슬롯 획득 타임아웃 수
    pub fn acquire_timeouts(&self) -> u64 {
        self.acquire_timeouts.load(Ordering::Relaxed)
    }

    /// 핸들러 실패 수
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

/// 이벤트 하나의 디스패치 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 슬롯을 얻어 핸들러 태스크를 시작함
    Dispatched,
    /// 처리 대상 상태가 아니거나 등록된 핸들러가 없음
    Ignored,
}

/// 이벤트 디스패처
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    handlers: Arc<HandlerTable>,
    acquire_timeout: Duration,
    max_acquire_retries: u32,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// 디스패처를 생성합니다.
    ///
    /// `max_acquire_retries`가 0이면 슬롯을 얻을 때까지 무제한 재시도합니다.
    pub fn new(
        pool: Arc<WorkerPool>,
        handlers: Arc<HandlerTable>,
        acquire_timeout: Duration,
        max_acquire_retries: u32,
    ) -> Self {
        Self {
            pool,
            handlers,
            acquire_timeout,
            max_acquire_retries,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// 카운터를 외부와 공유할 때 사용합니다.
    pub fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = stats;
        self
    }

    /// 디스패치 카운터
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// 큐가 닫히고 비워질 때까지 이벤트를 순서대로 디스패치합니다.
    pub async fn run(self, mut queue: mpsc::Receiver<LifecycleEvent>) {
        info!(
            capacity = self.pool.capacity(),
            acquire_timeout_secs = self.acquire_timeout.as_secs(),
            max_acquire_retries = self.max_acquire_retries,
            "dispatch loop started"
        );

        while let Some(event) = queue.recv().await {
            if let Err(e) = self.dispatch(event).await {
                error!(error = %e, "event dropped");
            }
        }

        info!("dispatch queue closed, dispatch loop finished");
    }

    /// 이벤트 하나를 디스패치합니다.
    ///
    /// 슬롯을 얻으면 핸들러 태스크를 spawn하고 바로 반환합니다.
    ///
    /// # Errors
    ///
    /// 재시도 한도 안에 슬롯을 얻지 못하면 `SyncError::PoolExhausted`를 반환합니다.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<DispatchOutcome, SyncError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::DISPATCHER_EVENTS_RECEIVED_TOTAL).increment(1);

        let Some(handlers) = self.handlers.handlers_for(&event.status) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::DISPATCHER_EVENTS_IGNORED_TOTAL).increment(1);
            debug!(
                event_id = %event.event_id,
                container_id = %event.subject_id,
                status = %event.status,
                "no handler registered for status, ignoring event"
            );
            return Ok(DispatchOutcome::Ignored);
        };
        let handlers = handlers.to_vec();

        let slot = self.acquire_slot(&event).await?;

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            m::DISPATCHER_EVENTS_DISPATCHED_TOTAL,
            m::LABEL_STATUS => event.status.as_str().to_owned()
        )
        .increment(1);
        debug!(
            event_id = %event.event_id,
            container_id = %event.subject_id,
            status = %event.status,
            slot = slot.id(),
            handlers = handlers.len(),
            "event dispatched"
        );

        let stats = Arc::clone(&self.stats);
        tokio::spawn(run_handlers(event, handlers, stats, slot));

        Ok(DispatchOutcome::Dispatched)
    }

    async fn acquire_slot(&self, event: &LifecycleEvent) -> Result<SlotGuard, SyncError> {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.pool.acquire(self.acquire_timeout).await {
                Ok(slot) => return Ok(slot),
                Err(SyncError::AcquireTimeout { waited }) => {
                    self.stats.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::DISPATCHER_ACQUIRE_TIMEOUTS_TOTAL).increment(1);

                    let exhausted =
                        self.max_acquire_retries != 0 && attempts > self.max_acquire_retries;
                    warn!(
                        event_id = %event.event_id,
                        container_id = %event.subject_id,
                        waited_secs = waited.as_secs(),
                        attempt = attempts,
                        busy = self.pool.outstanding(),
                        retrying = !exhausted,
                        "all worker slots busy"
                    );

                    if exhausted {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(m::DISPATCHER_EVENTS_DROPPED_TOTAL).increment(1);
                        return Err(SyncError::PoolExhausted {
                            event_id: event.event_id.clone(),
                            attempts,
                        });
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}

/// 등록된 핸들러를 모두 실행합니다. 한 핸들러의 실패나 panic은 나머지 실행을 막지 않습니다.
async fn run_handlers(
    event: LifecycleEvent,
    handlers: Vec<Arc<dyn EventHandler>>,
    stats: Arc<DispatchStats>,
    slot: SlotGuard,
) {
    let started = Instant::now();

    for handler in &handlers {
        let outcome = AssertUnwindSafe(handler.handle(&event))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(SyncError::Handler {
                    handler: handler.name().to_owned(),
                    reason: format!("panicked: {}", panic_message(payload.as_ref())),
                })
            });

        match outcome {
            Ok(()) => {
                debug!(
                    event_id = %event.event_id,
                    handler = handler.name(),
                    "handler completed"
                );
            }
            Err(e) => {
                stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::DISPATCHER_HANDLER_FAILURES_TOTAL).increment(1);
                error!(
                    event_id = %event.event_id,
                    container_id = %event.subject_id,
                    status = %event.status,
                    handler = handler.name(),
                    error = %e,
                    "handler failed"
                );
            }
        }
    }

    metrics::histogram!(m::DISPATCHER_HANDLER_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    drop(slot);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandicoot_core::event::EventStatus;
    use bandicoot_core::pipeline::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// 호출 수를 세고, 설정에 따라 실패하거나 gate가 열릴 때까지 대기하는 핸들러
    struct CountingHandler {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    impl CountingHandler {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail: false,
                gate: None,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail: true,
                gate: None,
            })
        }

        fn gated(name: &'static str, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail: false,
                gate: Some(gate),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn handle<'a>(
            &'a self,
            _event: &'a LifecycleEvent,
        ) -> BoxFuture<'a, Result<(), SyncError>> {
            Box::pin(async move {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    Err(SyncError::Handler {
                        handler: self.name.to_owned(),
                        reason: "simulated failure".to_owned(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    fn table_with(status: EventStatus, handlers: &[&Arc<CountingHandler>]) -> Arc<HandlerTable> {
        let mut table = HandlerTable::new();
        for handler in handlers {
            table
                .register(&status, Arc::clone(*handler) as Arc<dyn EventHandler>)
                .unwrap();
        }
        Arc::new(table)
    }

    fn started(id: &str) -> LifecycleEvent {
        LifecycleEvent::new(id, EventStatus::Started)
    }

    #[tokio::test]
    async fn events_within_capacity_never_time_out() {
        let handler = CountingHandler::ok("sync");
        let pool = WorkerPool::new(4).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(1),
            3,
        );
        let stats = dispatcher.stats();

        let (submitter, rx) = dispatch_queue(4);
        let run = tokio::spawn(dispatcher.run(rx));
        for i in 0..4 {
            submitter.submit(started(&format!("c{i}"))).await.unwrap();
        }
        drop(submitter);
        run.await.unwrap();

        assert!(pool.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(handler.calls(), 4);
        assert_eq!(stats.dispatched(), 4);
        assert_eq!(stats.acquire_timeouts(), 0);
    }

    #[tokio::test]
    async fn failing_handler_releases_slot_and_others_still_run() {
        let failing = CountingHandler::failing("broken");
        let healthy = CountingHandler::ok("healthy");
        let pool = WorkerPool::new(1).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&failing, &healthy]),
            Duration::from_secs(1),
            3,
        );

        for i in 0..3 {
            let outcome = dispatcher.dispatch(started(&format!("c{i}"))).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Dispatched);
        }

        assert!(pool.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(pool.available(), 1);
        assert_eq!(failing.calls(), 3);
        assert_eq!(healthy.calls(), 3);
        assert_eq!(dispatcher.stats().handler_failures(), 3);
    }

    struct PanickingHandler;

    fn buggy_sync() -> Result<(), SyncError> {
        panic!("handler bug")
    }

    impl EventHandler for PanickingHandler {
        fn name(&self) -> &str {
            "panicking"
        }

        fn handle<'a>(
            &'a self,
            _event: &'a LifecycleEvent,
        ) -> BoxFuture<'a, Result<(), SyncError>> {
            Box::pin(async move { buggy_sync() })
        }
    }

    #[tokio::test]
    async fn panicking_handler_releases_slot_and_dispatch_continues() {
        let healthy = CountingHandler::ok("healthy");
        let mut table = HandlerTable::new();
        table
            .register(&EventStatus::Started, Arc::new(PanickingHandler))
            .unwrap();
        table
            .register(&EventStatus::Started, Arc::clone(&healthy) as Arc<dyn EventHandler>)
            .unwrap();

        let pool = WorkerPool::new(1).unwrap();
        let dispatcher =
            Dispatcher::new(Arc::clone(&pool), Arc::new(table), Duration::from_secs(5), 3);
        let stats = dispatcher.stats();

        let (submitter, rx) = dispatch_queue(2);
        let run = tokio::spawn(dispatcher.run(rx));
        for i in 0..2 {
            submitter.submit(started(&format!("c{i}"))).await.unwrap();
        }
        drop(submitter);
        run.await.unwrap();

        assert!(pool.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(pool.available(), 1);
        assert_eq!(stats.dispatched(), 2);
        assert_eq!(stats.dropped(), 0);
        assert_eq!(stats.handler_failures(), 2);
        assert_eq!(healthy.calls(), 2);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bad index"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(static_str.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bad index");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn unhandled_status_is_ignored_without_slot() {
        let handler = CountingHandler::ok("sync");
        let pool = WorkerPool::new(1).unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(1),
            1,
        );

        let pause = LifecycleEvent::new("c0", EventStatus::Other("pause".to_owned()));
        assert_eq!(
            dispatcher.dispatch(pause).await.unwrap(),
            DispatchOutcome::Ignored
        );
        // Died에 등록된 핸들러가 없으므로 역시 무시
        let died = LifecycleEvent::new("c0", EventStatus::Died);
        assert_eq!(
            dispatcher.dispatch(died).await.unwrap(),
            DispatchOutcome::Ignored
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.ignored(), 2);
        assert_eq!(stats.acquire_timeouts(), 0);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_retries_drop_event() {
        let handler = CountingHandler::ok("sync");
        let pool = WorkerPool::new(1).unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(180),
            2,
        );

        let event = started("c0");
        let event_id = event.event_id.clone();
        let err = dispatcher.dispatch(event).await.unwrap_err();
        match err {
            SyncError::PoolExhausted {
                event_id: dropped,
                attempts,
            } => {
                assert_eq!(dropped, event_id);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.acquire_timeouts(), 3);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(handler.calls(), 0);
    }

    /// fmt 레이어 출력을 모아 두는 writer
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_acquire_timeout_is_logged_including_the_last() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let handler = CountingHandler::ok("sync");
        let pool = WorkerPool::new(1).unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(10),
            1,
        );

        let err = dispatcher.dispatch(started("c0")).await.unwrap_err();
        assert!(matches!(err, SyncError::PoolExhausted { attempts: 2, .. }));

        let output = logs.contents();
        let timeouts: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("all worker slots busy"))
            .collect();
        assert_eq!(timeouts.len(), 2, "{output}");
        assert!(timeouts[0].contains("retrying=true"), "{output}");
        assert!(timeouts[1].contains("retrying=false"), "{output}");
        assert!(timeouts[1].contains("attempt=2"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_retries_wait_for_slot() {
        let handler = CountingHandler::ok("sync");
        let pool = WorkerPool::new(1).unwrap();
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(180),
            0,
        );

        tokio::spawn(async move {
            // 타임아웃 5회 이상 경과 후 반환
            tokio::time::sleep(Duration::from_secs(1000)).await;
            drop(held);
        });

        let outcome = dispatcher.dispatch(started("c0")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Dispatched);
        assert_eq!(dispatcher.stats().acquire_timeouts(), 5);
        assert_eq!(dispatcher.stats().dropped(), 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_serializes_dispatch() {
        let gate = Arc::new(Notify::new());
        let handler = CountingHandler::gated("slow", Arc::clone(&gate));
        let pool = WorkerPool::new(1).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            table_with(EventStatus::Started, &[&handler]),
            Duration::from_secs(30),
            0,
        );
        let stats = dispatcher.stats();

        let (submitter, rx) = dispatch_queue(1);
        let run = tokio::spawn(dispatcher.run(rx));

        submitter.submit(started("c0")).await.unwrap();
        submitter.submit(started("c1")).await.unwrap();

        // 첫 이벤트가 슬롯을 잡고 있는 동안 두 번째는 대기
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.dispatched() < 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pool.available(), 0);
        assert_eq!(stats.dispatched(), 1);

        // gate를 열 때마다 대기 중인 핸들러 하나가 진행
        while handler.calls() < 2 {
            gate.notify_one();
            tokio::task::yield_now().await;
        }

        drop(submitter);
        run.await.unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(stats.dispatched(), 2);
    }

    #[tokio::test]
    async fn submitter_reports_closed_queue() {
        let (submitter, rx) = dispatch_queue(1);
        drop(rx);
        assert!(submitter.is_closed());
        assert!(matches!(
            submitter.submit(started("c0")).await,
            Err(SyncError::Channel(_))
        ));
    }
}
