//! # bandicoot-policy
//!
//! 컨테이너 레이블에 담긴 방화벽 정책 문서를 검증하고 방화벽 규칙으로 컴파일합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 컴파일 에러 (`CompileError`)
//! - [`document`]: 타입 검증 파싱 (`PolicyDocument`, `RuleOptions`)
//! - [`rule`]: 컴파일 결과 (`CompiledRule`, `CompiledDirective`, `RuleAction`)
//! - [`compiler`]: 컴파일러 (`PolicyCompiler`)
//!
//! # Flow
//!
//! ```text
//! ContainerMetadata + EventStatus
//!          |
//!     label lookup --(absent)--> []
//!          |
//!     PolicyDocument::parse
//!          |
//!     Vec<CompiledRule>  (chain = upper(key), action from status)
//! ```

pub mod compiler;
pub mod document;
pub mod error;
pub mod rule;

pub use compiler::{PolicyCompiler, compile_document};
pub use document::{ChainPolicy, MAX_POLICY_DOCUMENT_SIZE, PolicyDocument, RuleOptions, RuleSpec};
pub use error::CompileError;
pub use rule::{COMMENT_PREFIX, CompiledDirective, CompiledRule, RuleAction, comment_for_rule};
