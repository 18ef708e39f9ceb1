//! 워커 풀 -- 고정 용량의 슬롯으로 동시 핸들러 수를 제한합니다.
//!
//! 생성 시 N개의 [`WorkerSlot`]을 free 채널에 미리 채워 두고,
//! [`WorkerPool::acquire`]가 타임아웃과 함께 하나를 꺼냅니다.
//! 꺼낸 슬롯은 [`SlotGuard`]로 감싸져 있어 drop 시점에 반드시 풀로 돌아갑니다.
//! 핸들러가 에러를 반환하거나 태스크가 unwind되어도 슬롯은 누수되지 않습니다.
//!
//! ```text
//!   acquire ◄── free channel (N slots) ◄── release (SlotGuard::drop)
//!      │                                        ▲
//!      └──────── handler task holds guard ──────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};
use tracing::error;

use bandicoot_core::metrics as m;

use crate::error::SyncError;

/// 동시성 용량 한 단위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    id: usize,
}

impl WorkerSlot {
    /// 슬롯 번호 (0부터)
    pub fn id(&self) -> usize {
        self.id
    }
}

/// 고정 용량 워커 풀
pub struct WorkerPool {
    capacity: usize,
    free_tx: mpsc::Sender<WorkerSlot>,
    free_rx: Mutex<mpsc::Receiver<WorkerSlot>>,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl WorkerPool {
    /// `capacity`개의 슬롯을 free 상태로 채운 풀을 생성합니다.
    pub fn new(capacity: usize) -> Result<Arc<Self>, SyncError> {
        if capacity == 0 {
            return Err(SyncError::Config {
                field: "worker_pool_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let (free_tx, free_rx) = mpsc::channel(capacity);
        for id in 0..capacity {
            free_tx
                .try_send(WorkerSlot { id })
                .map_err(|e| SyncError::Channel(format!("failed to seed worker slot: {e}")))?;
        }

        Ok(Arc::new(Self {
            capacity,
            free_tx,
            free_rx: Mutex::new(free_rx),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }))
    }

    /// 슬롯 하나를 `timeout` 안에 획득합니다.
    ///
    /// # Errors
    ///
    /// 시간 안에 free 슬롯이 없으면 `SyncError::AcquireTimeout`을 반환합니다.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<SlotGuard, SyncError> {
        let slot = tokio::time::timeout(timeout, async {
            let mut free = self.free_rx.lock().await;
            free.recv().await
        })
        .await
        .map_err(|_| SyncError::AcquireTimeout { waited: timeout })?
        .ok_or_else(|| SyncError::Channel("worker slot channel closed".to_owned()))?;

        let busy = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!(m::DISPATCHER_WORKERS_BUSY).set(busy as f64);

        Ok(SlotGuard {
            slot: Some(slot),
            pool: Arc::clone(self),
        })
    }

    /// 슬롯을 풀로 반환합니다. `drop(guard)`와 같습니다.
    pub fn release(&self, guard: SlotGuard) {
        drop(guard);
    }

    fn put_back(&self, slot: WorkerSlot) {
        if let Err(e) = self.free_tx.try_send(slot) {
            // 슬롯 수가 채널 용량과 같으므로 정상 경로에서는 발생하지 않음
            error!(slot = slot.id, error = %e, "failed to return worker slot");
        }

        let busy = self.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::gauge!(m::DISPATCHER_WORKERS_BUSY).set(busy as f64);
        if busy == 0 {
            self.idle.notify_waiters();
        }
    }

    /// 전체 슬롯 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 현재 사용 중인 슬롯 수
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// 현재 free 슬롯 수
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.outstanding())
    }

    /// 모든 슬롯이 반환될 때까지 최대 `timeout` 동안 기다립니다.
    ///
    /// 시간 안에 idle 상태가 되면 `true`를 반환합니다.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.idle.notified();
                if self.outstanding() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

/// 획득한 슬롯. drop 시 풀로 반환됩니다.
pub struct SlotGuard {
    slot: Option<WorkerSlot>,
    pool: Arc<WorkerPool>,
}

impl SlotGuard {
    /// 보유한 슬롯 번호
    pub fn id(&self) -> usize {
        self.slot.map(|s| s.id).unwrap_or_default()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.put_back(slot);
        }
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard").field("slot", &self.slot).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_pool_is_full() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(SyncError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn acquire_and_release_cycle() {
        let pool = WorkerPool::new(2).unwrap();
        let a = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let b = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out() {
        let pool = WorkerPool::new(1).unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let err = pool.acquire(Duration::from_secs(180)).await.unwrap_err();
        match err {
            SyncError::AcquireTimeout { waited } => assert_eq!(waited, Duration::from_secs(180)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(pool.outstanding(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_released_slot() {
        let pool = WorkerPool::new(1).unwrap();
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let held_id = held.id();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(held);
        });

        let next = pool.acquire(Duration::from_secs(60)).await.unwrap();
        assert_eq!(next.id(), held_id);
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn slot_returns_when_task_fails() {
        let pool = WorkerPool::new(1).unwrap();
        let guard = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let task = tokio::spawn(async move {
            let _guard = guard;
            Err::<(), SyncError>(SyncError::Handler {
                handler: "test".to_owned(),
                reason: "boom".to_owned(),
            })
        });
        assert!(task.await.unwrap().is_err());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn concurrent_release_returns_every_slot() {
        let pool = WorkerPool::new(8).unwrap();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let guard = pool.acquire(Duration::from_secs(1)).await.unwrap();
            tasks.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                drop(guard);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(pool.available(), 8);
        assert!(pool.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_times_out_while_busy() {
        let pool = WorkerPool::new(1).unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert!(!pool.wait_idle(Duration::from_secs(30)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_wakes_on_last_release() {
        let pool = WorkerPool::new(2).unwrap();
        let a = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let b = pool.acquire(Duration::from_secs(1)).await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(a);
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(b);
        });

        assert!(pool.wait_idle(Duration::from_secs(10)).await);
        assert_eq!(pool.outstanding(), 0);
    }
}
