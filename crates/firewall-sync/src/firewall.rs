//! 방화벽 게이트웨이 -- 컴파일된 디렉티브를 커널 패킷 필터에 적용합니다.
//!
//! [`FirewallGateway`]는 두 가지 기본 연산(`append`, `delete`)만 제공합니다.
//! [`apply_rules`]가 규칙 집합의 디렉티브를 하나씩 독립적으로 적용하며,
//! 한 디렉티브의 실패는 기록만 하고 나머지 디렉티브 적용을 막지 않습니다.
//!
//! # 구현
//! - [`IptablesGateway`]: `iptables [-w] -t <table> -A|-D <chain> <args...>` 실행 (셸 미사용)
//! - [`DryRunGateway`]: 실행될 명령을 로그로만 출력
//! - [`ConfiguredGateway`]: 설정의 백엔드에 따라 둘 중 하나로 위임

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info};

use bandicoot_core::metrics as m;
use bandicoot_policy::{CompiledDirective, CompiledRule, RuleAction};

use crate::config::{FirewallBackend, SyncConfig};
use crate::error::SyncError;

/// 디렉티브 적용 인터페이스
pub trait FirewallGateway: Send + Sync + 'static {
    /// 로그에 표시되는 백엔드 이름
    fn name(&self) -> &'static str;

    /// 체인 끝에 디렉티브를 추가합니다.
    fn append(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// 체인에서 동일한 디렉티브를 삭제합니다.
    fn delete(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// iptables 명령의 전체 인자 목록을 만듭니다 (실행 파일명 제외).
pub fn iptables_args(
    wait_for_lock: bool,
    table: &str,
    action: RuleAction,
    chain: &str,
    directive: &CompiledDirective,
) -> Vec<String> {
    let op = match action {
        RuleAction::Append => "-A",
        RuleAction::Delete => "-D",
    };

    let mut args = Vec::with_capacity(directive.args().len() + 5);
    if wait_for_lock {
        args.push("-w".to_owned());
    }
    args.push("-t".to_owned());
    args.push(table.to_owned());
    args.push(op.to_owned());
    args.push(chain.to_owned());
    args.extend(directive.args().iter().cloned());
    args
}

/// `iptables` 실행 파일을 호출하는 게이트웨이
#[derive(Debug, Clone)]
pub struct IptablesGateway {
    binary: PathBuf,
    wait_for_lock: bool,
}

impl IptablesGateway {
    /// 실행 파일 경로와 잠금 대기 여부로 생성합니다.
    pub fn new(binary: impl Into<PathBuf>, wait_for_lock: bool) -> Self {
        Self {
            binary: binary.into(),
            wait_for_lock,
        }
    }

    async fn run(
        &self,
        table: &str,
        action: RuleAction,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        let args = iptables_args(self.wait_for_lock, table, action, chain, directive);

        // 타임아웃으로 future가 drop되면 자식 프로세스도 종료
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::Firewall {
                chain: chain.to_owned(),
                reason: format!("failed to run {}: {e}", self.binary.display()),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SyncError::Firewall {
            chain: chain.to_owned(),
            reason: format!("{} ({})", stderr.trim(), output.status),
        })
    }
}

impl FirewallGateway for IptablesGateway {
    fn name(&self) -> &'static str {
        "iptables"
    }

    async fn append(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        self.run(table, RuleAction::Append, chain, directive).await
    }

    async fn delete(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        self.run(table, RuleAction::Delete, chain, directive).await
    }
}

/// 규칙을 적용하지 않고 로그로만 출력하는 게이트웨이
#[derive(Debug, Clone, Default)]
pub struct DryRunGateway;

impl DryRunGateway {
    fn log(table: &str, action: RuleAction, chain: &str, directive: &CompiledDirective) {
        let args = iptables_args(false, table, action, chain, directive);
        info!(
            table,
            chain,
            action = %action,
            description = %directive.description,
            command = %format!("iptables {}", args.join(" ")),
            "dry-run: firewall directive not applied"
        );
    }
}

impl FirewallGateway for DryRunGateway {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn append(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        Self::log(table, RuleAction::Append, chain, directive);
        Ok(())
    }

    async fn delete(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        Self::log(table, RuleAction::Delete, chain, directive);
        Ok(())
    }
}

/// 설정된 백엔드로 위임하는 게이트웨이
#[derive(Debug, Clone)]
pub enum ConfiguredGateway {
    /// iptables 실행
    Iptables(IptablesGateway),
    /// 로그만 출력
    DryRun(DryRunGateway),
}

impl ConfiguredGateway {
    /// 동기화 설정의 백엔드로 게이트웨이를 생성합니다.
    pub fn from_config(config: &SyncConfig) -> Self {
        match config.backend {
            FirewallBackend::Iptables => Self::Iptables(IptablesGateway::new(
                &config.iptables_path,
                config.wait_for_lock,
            )),
            FirewallBackend::DryRun => Self::DryRun(DryRunGateway),
        }
    }
}

impl FirewallGateway for ConfiguredGateway {
    fn name(&self) -> &'static str {
        match self {
            Self::Iptables(g) => g.name(),
            Self::DryRun(g) => g.name(),
        }
    }

    async fn append(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        match self {
            Self::Iptables(g) => g.append(table, chain, directive).await,
            Self::DryRun(g) => g.append(table, chain, directive).await,
        }
    }

    async fn delete(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        match self {
            Self::Iptables(g) => g.delete(table, chain, directive).await,
            Self::DryRun(g) => g.delete(table, chain, directive).await,
        }
    }
}

/// 규칙 집합 적용 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// 성공한 디렉티브 수
    pub applied: usize,
    /// 실패한 디렉티브 수
    pub failed: usize,
}

/// 규칙 집합의 모든 디렉티브를 적용합니다.
///
/// 디렉티브마다 `timeout`이 적용되며, 각 호출은 독립적입니다.
///
/// # Errors
///
/// 하나 이상 실패하면 실패 수와 첫 실패 사유를 담은 `SyncError::Firewall`을 반환합니다.
/// 이때도 나머지 디렉티브는 모두 시도된 뒤입니다.
pub async fn apply_rules<G: FirewallGateway>(
    gateway: &G,
    table: &str,
    rules: &[CompiledRule],
    timeout: Duration,
) -> Result<ApplySummary, SyncError> {
    let mut summary = ApplySummary::default();
    let mut first_failure: Option<SyncError> = None;

    for rule in rules {
        for directive in &rule.directives {
            let call = async {
                match rule.action {
                    RuleAction::Append => gateway.append(table, &rule.chain, directive).await,
                    RuleAction::Delete => gateway.delete(table, &rule.chain, directive).await,
                }
            };

            let result = tokio::time::timeout(timeout, call)
                .await
                .unwrap_or_else(|_| {
                    Err(SyncError::Timeout {
                        operation: format!("{} {} on {}", gateway.name(), rule.action, rule.chain),
                        after: timeout,
                    })
                });

            match result {
                Ok(()) => {
                    summary.applied += 1;
                    metrics::counter!(
                        m::FIREWALL_DIRECTIVES_APPLIED_TOTAL,
                        m::LABEL_ACTION => rule.action.as_str()
                    )
                    .increment(1);
                    info!(
                        backend = gateway.name(),
                        table,
                        chain = %rule.chain,
                        action = %rule.action,
                        description = %directive.description,
                        "firewall directive applied"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::counter!(
                        m::FIREWALL_DIRECTIVE_FAILURES_TOTAL,
                        m::LABEL_ACTION => rule.action.as_str()
                    )
                    .increment(1);
                    error!(
                        backend = gateway.name(),
                        table,
                        chain = %rule.chain,
                        action = %rule.action,
                        description = %directive.description,
                        error = %e,
                        "firewall directive failed"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }
    }

    match first_failure {
        None => Ok(summary),
        Some(first) => {
            let chain = match &first {
                SyncError::Firewall { chain, .. } => chain.clone(),
                _ => rules
                    .iter()
                    .map(|r| r.chain.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            };
            Err(SyncError::Firewall {
                chain,
                reason: format!(
                    "{} of {} directive(s) failed, first: {first}",
                    summary.failed,
                    summary.applied + summary.failed
                ),
            })
        }
    }
}

/// 테스트용 기록 게이트웨이
///
/// 호출을 순서대로 기록하며, 지정한 설명의 디렉티브는 실패시킵니다.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingGateway {
    calls: std::sync::Mutex<Vec<(RuleAction, String, String, Vec<String>)>>,
    fail_descriptions: Vec<String>,
}

#[cfg(test)]
impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, description: &str) -> Self {
        self.fail_descriptions.push(description.to_owned());
        self
    }

    /// (action, table, chain, args) 기록
    pub fn calls(&self) -> Vec<(RuleAction, String, String, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(
        &self,
        action: RuleAction,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                action,
                table.to_owned(),
                chain.to_owned(),
                directive.args().to_vec(),
            ));
        }
        if self.fail_descriptions.contains(&directive.description) {
            return Err(SyncError::Firewall {
                chain: chain.to_owned(),
                reason: "iptables: Bad rule (does a matching rule exist in that chain?)".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
impl FirewallGateway for RecordingGateway {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn append(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        self.record(RuleAction::Append, table, chain, directive)
    }

    async fn delete(
        &self,
        table: &str,
        chain: &str,
        directive: &CompiledDirective,
    ) -> Result<(), SyncError> {
        self.record(RuleAction::Delete, table, chain, directive)
    }
}
