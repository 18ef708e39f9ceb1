//! 정책 컴파일 에러 타입
//!
//! [`CompileError`]는 정책 문서 하나를 컴파일하는 동안 발생하는 모든 에러를 표현합니다.
//! 에러는 항상 문서 전체에 적용되며, 일부 규칙만 컴파일된 결과는 반환되지 않습니다.

use bandicoot_core::error::{BandicootError, PolicyError};

/// 정책 컴파일 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Started/Died 이외의 상태로 컴파일을 요청함
    #[error("unsupported status '{0}': only start and die produce firewall rules")]
    UnsupportedStatus(String),

    /// 레이블 값이 정책 문서 형태로 파싱되지 않음
    #[error("malformed policy document: {reason}")]
    MalformedPolicy {
        /// 파싱 실패 사유
        reason: String,
    },

    /// 규칙 옵션 필드가 누락되었거나 타입이 맞지 않음
    #[error("invalid options for rule '{description}' in chain '{chain}': field '{field}' {reason}")]
    InvalidRuleOptions {
        /// 정책 문서의 체인 키 (원래 표기)
        chain: String,
        /// 규칙 설명
        description: String,
        /// 문제가 된 필드명
        field: String,
        /// 실패 사유
        reason: String,
    },
}

impl CompileError {
    /// 메트릭 레이블용 고정된 에러 종류명을 반환합니다.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedStatus(_) => "unsupported_status",
            Self::MalformedPolicy { .. } => "malformed_policy",
            Self::InvalidRuleOptions { .. } => "invalid_rule_options",
        }
    }
}

impl From<CompileError> for BandicootError {
    fn from(err: CompileError) -> Self {
        match &err {
            CompileError::UnsupportedStatus(status) => {
                BandicootError::Policy(PolicyError::UnsupportedStatus(status.clone()))
            }
            CompileError::MalformedPolicy { reason } => {
                BandicootError::Policy(PolicyError::Malformed(reason.clone()))
            }
            CompileError::InvalidRuleOptions { .. } => {
                BandicootError::Policy(PolicyError::InvalidRuleOptions(err.to_string()))
            }
        }
    }
}
