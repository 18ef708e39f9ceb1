//! 정책 컴파일러 -- 컨테이너 메타데이터 + 생명주기 상태 → 방화벽 규칙
//!
//! [`PolicyCompiler`]는 I/O와 공유 상태가 없는 순수 함수입니다.
//! 매 이벤트마다 현재 레이블 값으로 새로 컴파일하며 결과를 캐시하지 않습니다.
//!
//! # 처리 순서
//! 1. 상태 검사 (Started/Died 이외는 `UnsupportedStatus`)
//! 2. 정책 레이블 조회 (없으면 빈 결과)
//! 3. [`PolicyDocument::parse`]로 타입 검증 파싱
//! 4. 체인 키를 대문자로 변환하고 같은 체인끼리 병합
//! 5. 규칙마다 디렉티브 하나씩 생성 (문서 순서 유지)

use tracing::debug;

use bandicoot_core::config::DEFAULT_POLICY_LABEL;
use bandicoot_core::event::EventStatus;
use bandicoot_core::types::ContainerMetadata;

use crate::document::PolicyDocument;
use crate::error::CompileError;
use crate::rule::{CompiledDirective, CompiledRule, RuleAction};

/// 정책 컴파일러
///
/// 정책 문서를 찾을 레이블 키만 보유합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCompiler {
    label_key: String,
}

impl PolicyCompiler {
    /// 지정한 레이블 키로 컴파일러를 생성합니다.
    pub fn new(label_key: impl Into<String>) -> Self {
        Self {
            label_key: label_key.into(),
        }
    }

    /// 정책 문서를 읽는 레이블 키
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    /// 컨테이너 메타데이터와 상태로 규칙 집합을 컴파일합니다.
    ///
    /// 정책 레이블이 없는 컨테이너는 에러 없이 빈 목록을 반환합니다.
    ///
    /// # Errors
    ///
    /// - `UnsupportedStatus`: 상태가 Started/Died가 아님 (레이블 조회 전에 검사)
    /// - `MalformedPolicy` / `InvalidRuleOptions`: 문서 전체가 거부됨
    pub fn compile(
        &self,
        metadata: &ContainerMetadata,
        status: &EventStatus,
    ) -> Result<Vec<CompiledRule>, CompileError> {
        let action = RuleAction::from_status(status)?;

        let Some(raw) = metadata.label(&self.label_key) else {
            debug!(
                container_id = %metadata.id,
                label = %self.label_key,
                "container has no firewall policy label"
            );
            return Ok(Vec::new());
        };

        let rules = compile_document(raw, action)?;
        debug!(
            container_id = %metadata.id,
            action = %action,
            chains = rules.len(),
            "compiled firewall policy"
        );
        Ok(rules)
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_POLICY_LABEL)
    }
}

/// 레이블 값 하나를 주어진 액션으로 컴파일합니다.
///
/// 대소문자만 다른 체인 키는 하나의 [`CompiledRule`]로 병합되며, 체인 순서는
/// 처음 등장한 순서입니다. 규칙이 없는 체인은 결과에 포함되지 않습니다.
pub fn compile_document(raw: &str, action: RuleAction) -> Result<Vec<CompiledRule>, CompileError> {
    let document = PolicyDocument::parse(raw)?;

    let mut rules: Vec<CompiledRule> = Vec::with_capacity(document.chains.len());
    for chain_policy in document.chains {
        if chain_policy.rules.is_empty() {
            continue;
        }

        let chain = chain_policy.key.to_uppercase();
        let directives = chain_policy.rules.iter().map(|rule| {
            let opts = &rule.options;
            CompiledDirective::new(
                &rule.description,
                &opts.protocol,
                opts.destination_port,
                &opts.match_module,
                &opts.connection_states,
                &opts.target,
            )
        });

        match rules.iter_mut().find(|r| r.chain == chain) {
            Some(existing) => existing.directives.extend(directives),
            None => rules.push(CompiledRule {
                action,
                chain,
                directives: directives.collect(),
            }),
        }
    }

    Ok(rules)
}
