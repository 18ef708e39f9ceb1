//! 정책 문서 -- 컨테이너 레이블 값의 타입 검증 파싱
//!
//! 레이블 값은 외부에서 주어지는 약타입 JSON입니다:
//!
//! ```text
//! { "<chain>": { "<description>": { "protocol": "tcp", "destinationPort": 443,
//!                                   "match": "conntrack",
//!                                   "connectionStates": ["NEW", "ESTABLISHED"],
//!                                   "target": "ACCEPT" } } }
//! ```
//!
//! [`PolicyDocument::parse`]는 이 값을 한 번에 검증하여 타입이 있는 구조로 변환합니다.
//! 형태가 맞지 않으면 어느 필드가 문제인지 명시한 에러를 반환하며,
//! 일부만 파싱된 문서는 절대 반환하지 않습니다. 체인과 규칙은 문서에 나온 순서를 유지합니다.

use serde_json::{Map, Value};

use crate::error::CompileError;

/// Maximum label value size (64 KiB) accepted as a policy document
pub const MAX_POLICY_DOCUMENT_SIZE: usize = 64 * 1024;

/// 규칙 옵션 필드명 (문서 표기)
pub const FIELD_PROTOCOL: &str = "protocol";
/// 목적지 포트 필드명
pub const FIELD_DESTINATION_PORT: &str = "destinationPort";
/// 매치 모듈 필드명
pub const FIELD_MATCH: &str = "match";
/// 연결 상태 목록 필드명
pub const FIELD_CONNECTION_STATES: &str = "connectionStates";
/// 타겟 필드명
pub const FIELD_TARGET: &str = "target";

/// 파싱된 정책 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    /// 문서 순서의 체인 목록
    pub chains: Vec<ChainPolicy>,
}

/// 체인 하나에 선언된 규칙들
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPolicy {
    /// 문서에 적힌 체인 키 (대소문자 원본)
    pub key: String,
    /// 문서 순서의 규칙 목록
    pub rules: Vec<RuleSpec>,
}

/// 설명과 옵션으로 이루어진 규칙 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    /// 규칙 설명 (주석에만 사용, 중복 검사하지 않음)
    pub description: String,
    /// 검증된 옵션
    pub options: RuleOptions,
}

/// 검증된 규칙 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOptions {
    /// 프로토콜 (`-p`)
    pub protocol: String,
    /// 목적지 포트 (`--dport`)
    pub destination_port: u16,
    /// 매치 모듈 (`-m`)
    pub match_module: String,
    /// 연결 상태 목록, 문서 순서 그대로 (`--ctstate`)
    pub connection_states: Vec<String>,
    /// 타겟 (`-j`)
    pub target: String,
}

impl PolicyDocument {
    /// 레이블 값을 정책 문서로 파싱합니다.
    ///
    /// # Errors
    ///
    /// - `MalformedPolicy`: JSON이 아니거나, 최상위/체인 값이 객체가 아니거나, 크기 초과
    /// - `InvalidRuleOptions`: 규칙 옵션 필드가 누락되었거나 타입이 맞지 않음
    pub fn parse(raw: &str) -> Result<Self, CompileError> {
        if raw.len() > MAX_POLICY_DOCUMENT_SIZE {
            return Err(CompileError::MalformedPolicy {
                reason: format!(
                    "document is {} bytes (max: {MAX_POLICY_DOCUMENT_SIZE})",
                    raw.len()
                ),
            });
        }

        let value: Value =
            serde_json::from_str(raw).map_err(|e| CompileError::MalformedPolicy {
                reason: e.to_string(),
            })?;

        let Value::Object(root) = value else {
            return Err(CompileError::MalformedPolicy {
                reason: format!(
                    "expected an object of chains, found {}",
                    json_type_name(&value)
                ),
            });
        };

        let mut chains = Vec::with_capacity(root.len());
        for (key, rules_value) in &root {
            if key.trim().is_empty() {
                return Err(CompileError::MalformedPolicy {
                    reason: "chain name must not be empty".to_owned(),
                });
            }

            let Value::Object(rules_map) = rules_value else {
                return Err(CompileError::MalformedPolicy {
                    reason: format!(
                        "chain '{key}' must map rule descriptions to options, found {}",
                        json_type_name(rules_value)
                    ),
                });
            };

            let mut rules = Vec::with_capacity(rules_map.len());
            for (description, options_value) in rules_map {
                let options = RuleOptions::from_value(key, description, options_value)?;
                rules.push(RuleSpec {
                    description: description.clone(),
                    options,
                });
            }

            chains.push(ChainPolicy {
                key: key.clone(),
                rules,
            });
        }

        Ok(Self { chains })
    }

    /// 모든 체인의 규칙 수 합계
    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }
}

impl RuleOptions {
    fn from_value(chain: &str, description: &str, value: &Value) -> Result<Self, CompileError> {
        let invalid = |field: &str, reason: String| CompileError::InvalidRuleOptions {
            chain: chain.to_owned(),
            description: description.to_owned(),
            field: field.to_owned(),
            reason,
        };

        let Value::Object(options) = value else {
            return Err(invalid(
                "options",
                format!("must be an object, found {}", json_type_name(value)),
            ));
        };

        let protocol =
            require_string(options, FIELD_PROTOCOL).map_err(|r| invalid(FIELD_PROTOCOL, r))?;
        let destination_port =
            require_port(options).map_err(|r| invalid(FIELD_DESTINATION_PORT, r))?;
        let match_module =
            require_string(options, FIELD_MATCH).map_err(|r| invalid(FIELD_MATCH, r))?;
        let connection_states =
            require_states(options).map_err(|r| invalid(FIELD_CONNECTION_STATES, r))?;
        let target =
            require_string(options, FIELD_TARGET).map_err(|r| invalid(FIELD_TARGET, r))?;

        Ok(Self {
            protocol,
            destination_port,
            match_module,
            connection_states,
            target,
        })
    }
}

fn require_string(options: &Map<String, Value>, field: &str) -> Result<String, String> {
    match options.get(field) {
        None => Err("is missing".to_owned()),
        Some(Value::String(s)) if s.trim().is_empty() => Err("must not be empty".to_owned()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!("must be a string, found {}", json_type_name(other))),
    }
}

/// 포트는 정수 값이면 부동소수 표기(`443.0`)도 허용하고, 항상 정수 텍스트로 렌더링됩니다.
fn require_port(options: &Map<String, Value>) -> Result<u16, String> {
    let number = match options.get(FIELD_DESTINATION_PORT) {
        None => return Err("is missing".to_owned()),
        Some(Value::Number(n)) => n,
        Some(other) => {
            return Err(format!(
                "must be a number, found {}",
                json_type_name(other)
            ));
        }
    };

    let port = if let Some(whole) = number.as_u64() {
        whole
    } else {
        let float = number.as_f64().unwrap_or(f64::NAN);
        if float.fract() != 0.0 || !float.is_finite() {
            return Err(format!("must be a whole number, found {number}"));
        }
        if float < 0.0 {
            return Err(format!("must be 1-65535, found {number}"));
        }
        // fract() == 0 이고 음수가 아니므로 손실 없는 변환
        float as u64
    };

    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(format!("must be 1-65535, found {number}")),
    }
}

fn require_states(options: &Map<String, Value>) -> Result<Vec<String>, String> {
    let items = match options.get(FIELD_CONNECTION_STATES) {
        None => return Err("is missing".to_owned()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(format!(
                "must be an array of strings, found {}",
                json_type_name(other)
            ));
        }
    };

    if items.is_empty() {
        return Err("must contain at least one state".to_owned());
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
            Value::String(_) => Err(format!("element {i} must not be empty")),
            other => Err(format!(
                "element {i} must be a string, found {}",
                json_type_name(other)
            )),
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
