//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수로 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `bandicoot_`
//! - 모듈명: `dispatcher_`, `policy_`, `firewall_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 방화벽 액션 레이블 키 (append, delete)
pub const LABEL_ACTION: &str = "action";

/// 이벤트 상태 레이블 키 (start, die)
pub const LABEL_STATUS: &str = "status";

/// 컴파일 에러 종류 레이블 키
pub const LABEL_KIND: &str = "kind";

// ─── Dispatcher 메트릭 ─────────────────────────────────────────────

/// Dispatcher: 큐에서 꺼낸 이벤트 수 (counter)
pub const DISPATCHER_EVENTS_RECEIVED_TOTAL: &str = "bandicoot_dispatcher_events_received_total";

/// Dispatcher: 핸들러가 없어 무시된 이벤트 수 (counter)
pub const DISPATCHER_EVENTS_IGNORED_TOTAL: &str = "bandicoot_dispatcher_events_ignored_total";

/// Dispatcher: 워커에 넘겨진 이벤트 수 (counter, label: status)
pub const DISPATCHER_EVENTS_DISPATCHED_TOTAL: &str =
    "bandicoot_dispatcher_events_dispatched_total";

/// Dispatcher: 재시도 한도 초과로 폐기된 이벤트 수 (counter)
pub const DISPATCHER_EVENTS_DROPPED_TOTAL: &str = "bandicoot_dispatcher_events_dropped_total";

/// Dispatcher: 슬롯 획득 타임아웃 수 (counter)
pub const DISPATCHER_ACQUIRE_TIMEOUTS_TOTAL: &str =
    "bandicoot_dispatcher_acquire_timeouts_total";

/// Dispatcher: 핸들러 실패 수 (counter)
pub const DISPATCHER_HANDLER_FAILURES_TOTAL: &str =
    "bandicoot_dispatcher_handler_failures_total";

/// Dispatcher: 사용 중인 워커 슬롯 수 (gauge)
pub const DISPATCHER_WORKERS_BUSY: &str = "bandicoot_dispatcher_workers_busy";

/// Dispatcher: 이벤트 하나의 핸들러 실행 시간 (histogram, 초)
pub const DISPATCHER_HANDLER_DURATION_SECONDS: &str =
    "bandicoot_dispatcher_handler_duration_seconds";

// ─── Policy 메트릭 ─────────────────────────────────────────────────

/// Policy: 컴파일 에러 수 (counter, label: kind)
pub const POLICY_COMPILE_ERRORS_TOTAL: &str = "bandicoot_policy_compile_errors_total";

// ─── Firewall 메트릭 ───────────────────────────────────────────────

/// Firewall: 적용된 디렉티브 수 (counter, label: action)
pub const FIREWALL_DIRECTIVES_APPLIED_TOTAL: &str =
    "bandicoot_firewall_directives_applied_total";

/// Firewall: 적용 실패한 디렉티브 수 (counter, label: action)
pub const FIREWALL_DIRECTIVE_FAILURES_TOTAL: &str =
    "bandicoot_firewall_directive_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "bandicoot_daemon_build_info";

/// 핸들러 실행 시간 히스토그램 버킷 (초)
///
/// Docker 조회와 iptables 호출을 포함하므로 1ms ~ 60s 범위
pub const HANDLER_DURATION_BUCKETS: [f64; 9] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0, 60.0];

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        DISPATCHER_EVENTS_RECEIVED_TOTAL,
        "Total number of lifecycle events taken off the dispatch queue"
    );
    describe_counter!(
        DISPATCHER_EVENTS_IGNORED_TOTAL,
        "Lifecycle events with no registered handler"
    );
    describe_counter!(
        DISPATCHER_EVENTS_DISPATCHED_TOTAL,
        "Lifecycle events handed to a worker slot"
    );
    describe_counter!(
        DISPATCHER_EVENTS_DROPPED_TOTAL,
        "Lifecycle events dropped after exhausting slot acquisition retries"
    );
    describe_counter!(
        DISPATCHER_ACQUIRE_TIMEOUTS_TOTAL,
        "Timeouts while waiting for a free worker slot"
    );
    describe_counter!(
        DISPATCHER_HANDLER_FAILURES_TOTAL,
        "Handler invocations that returned an error"
    );
    describe_gauge!(
        DISPATCHER_WORKERS_BUSY,
        "Worker slots currently held by running handlers"
    );
    describe_histogram!(
        DISPATCHER_HANDLER_DURATION_SECONDS,
        "Time spent running all handlers for one event in seconds"
    );
    describe_counter!(
        POLICY_COMPILE_ERRORS_TOTAL,
        "Policy documents that failed to compile, by error kind"
    );
    describe_counter!(
        FIREWALL_DIRECTIVES_APPLIED_TOTAL,
        "Firewall directives applied successfully, by action"
    );
    describe_counter!(
        FIREWALL_DIRECTIVE_FAILURES_TOTAL,
        "Firewall directives that failed to apply, by action"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
