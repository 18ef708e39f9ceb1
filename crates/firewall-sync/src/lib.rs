//! # bandicoot-firewall-sync
//!
//! Docker 컨테이너 생명주기 이벤트를 받아 컨테이너 레이블의 방화벽 정책을
//! 호스트 패킷 필터에 추가/삭제합니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`SyncError`)
//! - [`config`]: Sync configuration (`SyncConfig`, builder, `FirewallBackend`)
//! - [`pool`]: Bounded worker slots (`WorkerPool`, `SlotGuard`)
//! - [`handler`]: Handler trait and per-status table (`EventHandler`, `HandlerTable`)
//! - [`dispatcher`]: Queue consumer (`Dispatcher`, `EventSubmitter`)
//! - [`docker`]: Docker API abstraction (`DockerClient`, `EventSource`, `BollardDockerClient`)
//! - [`firewall`]: Firewall gateways (`FirewallGateway`, `IptablesGateway`, `DryRunGateway`)
//! - [`sync`]: Inspect, compile, apply (`FirewallSyncHandler`)
//! - [`watcher`]: Main orchestrator (`FirewallWatcher`, `FirewallWatcherBuilder`)
//!
//! # Architecture
//!
//! ```text
//! Docker events --feed--> EventSubmitter --mpsc--> Dispatcher
//!                                                      |
//!                                             WorkerPool.acquire()
//!                                                      |
//!                                     FirewallSyncHandler (inspect/compile/apply)
//!                                                      |
//!                                              FirewallGateway
//! ```

pub mod config;
pub mod dispatcher;
pub mod docker;
pub mod error;
pub mod firewall;
pub mod handler;
pub mod pool;
pub mod sync;
pub mod watcher;

// --- Public API Re-exports ---

// Watcher (main orchestrator)
pub use watcher::{FirewallWatcher, FirewallWatcherBuilder};

// Configuration
pub use config::{FirewallBackend, SyncConfig, SyncConfigBuilder};

// Error
pub use error::SyncError;

// Dispatch
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher, EventSubmitter, dispatch_queue};
pub use handler::{EventHandler, HandlerTable};
pub use pool::{SlotGuard, WorkerPool, WorkerSlot};

// Docker API
pub use docker::{BollardDockerClient, DockerClient, EventSource, validate_container_id};

// Firewall
pub use firewall::{
    ApplySummary, ConfiguredGateway, DryRunGateway, FirewallGateway, IptablesGateway,
    apply_rules, iptables_args,
};

// Sync handler
pub use sync::{FIREWALL_SYNC_HANDLER, FirewallSyncHandler};
