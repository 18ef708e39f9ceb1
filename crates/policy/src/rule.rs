//! 컴파일된 방화벽 규칙
//!
//! [`CompiledRule`]은 체인 하나에 대해 같은 액션으로 적용할
//! [`CompiledDirective`] 목록입니다. 디렉티브 인자 순서는 고정입니다:
//!
//! ```text
//! -p <protocol> --dport <port> -m <match> --ctstate <states> -j <target> -m comment --comment "Bandicoot: <description>"
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use bandicoot_core::event::EventStatus;

use crate::error::CompileError;

/// 규칙 출처를 표시하는 주석 접두어
pub const COMMENT_PREFIX: &str = "Bandicoot";

/// 방화벽 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleAction {
    /// 체인 끝에 규칙 추가 (컨테이너 시작)
    Append,
    /// 동일한 규칙 삭제 (컨테이너 종료)
    Delete,
}

impl RuleAction {
    /// 이벤트 상태에서 액션을 결정합니다.
    ///
    /// Started → Append, Died → Delete. 그 외 상태는 에러입니다.
    pub fn from_status(status: &EventStatus) -> Result<Self, CompileError> {
        match status {
            EventStatus::Started => Ok(Self::Append),
            EventStatus::Died => Ok(Self::Delete),
            EventStatus::Other(other) => Err(CompileError::UnsupportedStatus(other.clone())),
        }
    }

    /// 메트릭 태그용 고정된 액션명을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "Append"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// 규칙 하나의 고정 순서 인자 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledDirective {
    /// 출처 규칙 설명
    pub description: String,
    args: Vec<String>,
}

impl CompiledDirective {
    pub(crate) fn new(
        description: &str,
        protocol: &str,
        port: u16,
        match_module: &str,
        connection_states: &[String],
        target: &str,
    ) -> Self {
        let args = vec![
            "-p".to_owned(),
            protocol.to_owned(),
            "--dport".to_owned(),
            port.to_string(),
            "-m".to_owned(),
            match_module.to_owned(),
            "--ctstate".to_owned(),
            connection_states.join(","),
            "-j".to_owned(),
            target.to_owned(),
            "-m".to_owned(),
            "comment".to_owned(),
            "--comment".to_owned(),
            comment_for_rule(description),
        ];
        Self {
            description: description.to_owned(),
            args,
        }
    }

    /// 방화벽 엔진에 전달할 인자 목록
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 인자 목록을 소유권과 함께 반환합니다.
    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Display for CompiledDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// 규칙 설명으로 출처 주석을 만듭니다. 따옴표가 주석 값에 포함됩니다.
pub fn comment_for_rule(description: &str) -> String {
    format!("\"{COMMENT_PREFIX}: {description}\"")
}

/// 체인 하나에 대한 컴파일 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    /// 적용 액션
    pub action: RuleAction,
    /// 대문자로 변환된 체인명
    pub chain: String,
    /// 문서 순서를 유지한 디렉티브 목록
    pub directives: Vec<CompiledDirective>,
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} directive(s))",
            self.action,
            self.chain,
            self.directives.len()
        )
    }
}
