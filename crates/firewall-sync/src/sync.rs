//! 방화벽 동기화 핸들러 -- 조회, 컴파일, 적용
//!
//! [`FirewallSyncHandler`]는 Started와 Died 양쪽에 등록되는 핸들러입니다.
//!
//! 1. Docker에서 컨테이너 메타데이터를 새로 조회 (`inspect_timeout`)
//! 2. 정책 레이블을 상태에 맞는 규칙 집합으로 컴파일
//! 3. 디렉티브를 하나씩 게이트웨이로 적용 (`apply_timeout`)
//!
//! 정책 문서가 잘못되어도 해당 이벤트만 실패하며, 워처는 계속 실행됩니다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use bandicoot_core::event::LifecycleEvent;
use bandicoot_core::metrics as m;
use bandicoot_core::pipeline::BoxFuture;
use bandicoot_policy::PolicyCompiler;

use crate::config::SyncConfig;
use crate::docker::DockerClient;
use crate::error::SyncError;
use crate::firewall::{FirewallGateway, apply_rules};
use crate::handler::EventHandler;

/// 핸들러 이름
pub const FIREWALL_SYNC_HANDLER: &str = "firewall-sync";

/// 컨테이너 정책 레이블을 방화벽에 반영하는 핸들러
pub struct FirewallSyncHandler<D: DockerClient, G: FirewallGateway> {
    docker: Arc<D>,
    gateway: Arc<G>,
    compiler: PolicyCompiler,
    table: String,
    inspect_timeout: Duration,
    apply_timeout: Duration,
}

impl<D: DockerClient, G: FirewallGateway> FirewallSyncHandler<D, G> {
    /// 설정값으로 핸들러를 생성합니다.
    pub fn new(docker: Arc<D>, gateway: Arc<G>, config: &SyncConfig) -> Self {
        Self {
            docker,
            gateway,
            compiler: PolicyCompiler::new(config.label_key.clone()),
            table: config.table.clone(),
            inspect_timeout: config.inspect_timeout(),
            apply_timeout: config.apply_timeout(),
        }
    }

    /// 이벤트 하나를 처리합니다.
    pub async fn sync(&self, event: &LifecycleEvent) -> Result<(), SyncError> {
        let metadata = tokio::time::timeout(
            self.inspect_timeout,
            self.docker.inspect_container(&event.subject_id),
        )
        .await
        .map_err(|_| SyncError::Timeout {
            operation: format!("inspect container {}", event.subject_id),
            after: self.inspect_timeout,
        })??;

        let rules = match self.compiler.compile(&metadata, &event.status) {
            Ok(rules) => rules,
            Err(e) => {
                metrics::counter!(m::POLICY_COMPILE_ERRORS_TOTAL, m::LABEL_KIND => e.kind())
                    .increment(1);
                warn!(
                    event_id = %event.event_id,
                    container_id = %metadata.id,
                    container_name = %metadata.name,
                    error = %e,
                    "firewall policy rejected, no rules applied for this event"
                );
                return Err(e.into());
            }
        };

        if rules.is_empty() {
            debug!(
                event_id = %event.event_id,
                container_id = %metadata.id,
                "no firewall rules to apply"
            );
            return Ok(());
        }

        let summary = apply_rules(
            self.gateway.as_ref(),
            &self.table,
            &rules,
            self.apply_timeout,
        )
        .await?;

        info!(
            event_id = %event.event_id,
            container_id = %metadata.id,
            container_name = %metadata.name,
            status = %event.status,
            chains = rules.len(),
            directives = summary.applied,
            "firewall synchronized"
        );
        Ok(())
    }
}

impl<D: DockerClient, G: FirewallGateway> EventHandler for FirewallSyncHandler<D, G> {
    fn name(&self) -> &str {
        FIREWALL_SYNC_HANDLER
    }

    fn handle<'a>(&'a self, event: &'a LifecycleEvent) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.sync(event))
    }
}
