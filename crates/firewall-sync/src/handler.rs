//! 이벤트 핸들러와 상태별 디스패치 테이블
//!
//! [`HandlerTable`]은 닫힌 상태 집합(Started, Died)을 키로 하는 정적 테이블입니다.
//! 상태마다 여러 핸들러를 등록할 수 있고 등록 순서대로 모두 실행됩니다.
//! 그 외 상태(`EventStatus::Other`)는 등록 대상이 아니며 조회 시 `None`을 반환합니다.

use std::fmt;
use std::sync::Arc;

use bandicoot_core::event::{EventStatus, LifecycleEvent};
use bandicoot_core::pipeline::BoxFuture;

use crate::error::SyncError;

/// 생명주기 이벤트 하나를 처리하는 핸들러
///
/// 여러 상태에 같은 인스턴스를 등록할 수 있도록 `Arc<dyn EventHandler>`로 보관됩니다.
pub trait EventHandler: Send + Sync + 'static {
    /// 로그와 에러에 표시되는 핸들러 이름
    fn name(&self) -> &str;

    /// 이벤트를 처리합니다. 에러는 디스패처가 기록하며 전파되지 않습니다.
    fn handle<'a>(&'a self, event: &'a LifecycleEvent) -> BoxFuture<'a, Result<(), SyncError>>;
}

/// 상태별 핸들러 테이블
#[derive(Default, Clone)]
pub struct HandlerTable {
    started: Vec<Arc<dyn EventHandler>>,
    died: Vec<Arc<dyn EventHandler>>,
}

impl HandlerTable {
    /// 빈 테이블을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 상태에 핸들러를 추가합니다.
    ///
    /// # Errors
    ///
    /// Started/Died 이외의 상태에는 등록할 수 없습니다.
    pub fn register(
        &mut self,
        status: &EventStatus,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), SyncError> {
        match status {
            EventStatus::Started => self.started.push(handler),
            EventStatus::Died => self.died.push(handler),
            EventStatus::Other(other) => {
                return Err(SyncError::Config {
                    field: "handlers".to_owned(),
                    reason: format!("cannot register a handler for status '{other}'"),
                });
            }
        }
        Ok(())
    }

    /// 상태에 등록된 핸들러 목록을 반환합니다.
    ///
    /// 처리 대상이 아닌 상태이거나 등록된 핸들러가 없으면 `None`입니다.
    pub fn handlers_for(&self, status: &EventStatus) -> Option<&[Arc<dyn EventHandler>]> {
        let handlers = match status {
            EventStatus::Started => &self.started,
            EventStatus::Died => &self.died,
            EventStatus::Other(_) => return None,
        };
        (!handlers.is_empty()).then_some(handlers.as_slice())
    }

    /// 전체 등록 수 (상태별 중복 포함)
    pub fn len(&self) -> usize {
        self.started.len() + self.died.len()
    }

    /// 등록된 핸들러가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |handlers: &[Arc<dyn EventHandler>]| -> Vec<String> {
            handlers.iter().map(|h| h.name().to_owned()).collect()
        };
        f.debug_struct("HandlerTable")
            .field("started", &names(&self.started))
            .field("died", &names(&self.died))
            .finish()
    }
}
