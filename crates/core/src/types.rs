//! 도메인 타입 -- 크레이트 간 공유되는 컨테이너 정보

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 컨테이너 메타데이터
///
/// 이벤트마다 런타임에서 새로 조회되며 캐시하지 않습니다.
/// 따라서 레이블은 이벤트 발생 시점이 아니라 조회 시점의 상태를 반영합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (로그용, 앞의 `/` 제거)
    pub name: String,
    /// 컨테이너 레이블
    pub labels: HashMap<String, String>,
}

impl ContainerMetadata {
    /// 레이블 없는 메타데이터를 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    /// 레이블을 추가합니다.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// 레이블 값을 조회합니다.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup() {
        let meta = ContainerMetadata::new("abc123", "web")
            .with_label("io.bandicoot.rules", "{}")
            .with_label("maintainer", "ops");
        assert_eq!(meta.label("io.bandicoot.rules"), Some("{}"));
        assert_eq!(meta.label("missing"), None);
        assert_eq!(meta.labels.len(), 2);
    }
}
