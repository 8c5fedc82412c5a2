//! 하네스 에러 타입
//!
//! [`HarnessError`]는 케이스 구성, 준비/정리, 스테이지 실행 중 발생하는 모든 에러를
//! 표현합니다. 구성 에러는 원격 호출 전에 빌더에서 반환되고, 나머지는 케이스
//! 단위로 보고됩니다.

use std::fmt;
use std::time::Duration;

use flowtest_core::error::{DirectiveError, StoreError};
use flowtest_core::resources::WorkflowStatus;
use flowtest_core::stage::Stage;

/// 스테이지 대기에서 기다린 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// `ready=true, status=Completed`
    Ready,
    /// `ready=false, status=Error`
    Error,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// 타임아웃 직전에 관찰한 워크플로 상태
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observed(pub Option<WorkflowStatus>);

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("no status"),
            Some(status) => {
                let state = status.state.map_or("<none>", |s| s.as_str());
                write!(
                    f,
                    "state={state} ready={} status={}",
                    status.ready, status.status
                )?;
                if !status.message.is_empty() {
                    write!(f, " message={:?}", status.message)?;
                }
                Ok(())
            }
        }
    }
}

/// 하네스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 케이스 구성 에러 (작성자 실수, 원격 호출 전 반환)
    #[error("configuration error in test '{test}': {reason}")]
    Configuration {
        /// 케이스 이름
        test: String,
        /// 누락된 전제 조건
        reason: String,
    },

    /// 원격 저장소 호출 실패
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 디렉티브 파싱 실패
    #[error(transparent)]
    Directive(#[from] DirectiveError),

    /// 스테이지 대기 시간 초과
    #[error(
        "workflow '{workflow}' did not become {expected} in {stage} within {timeout:?} (last observed: {last_observed})"
    )]
    StageTimeout {
        workflow: String,
        stage: Stage,
        expected: Expectation,
        timeout: Duration,
        last_observed: Observed,
    },

    /// 기타 대기 시간 초과 (스토리지 준비, 브레이크다운 준비 등)
    #[error("timed out after {timeout:?} waiting for {what}")]
    WaitTimeout { what: String, timeout: Duration },

    /// 삭제 후 객체가 사라지지 않음
    #[error("{kind} '{name}' was not deleted")]
    NotDeleted { kind: String, name: String },

    /// 헬퍼 파드 실패
    #[error("helper pod '{pod}' failed: {reason}")]
    HelperFailed { pod: String, reason: String },

    /// 원격 객체가 기대한 초기 상태가 아님
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// 이전 실패로 시스템이 점검 대기 중
    #[error("system requires triage; delete the '{namespace}' namespace when finished")]
    TriageRequired { namespace: String },

    /// 개발자가 시스템을 예약함
    #[error("system is currently reserved by '{developer}'")]
    Reserved { developer: String },
}

impl HarnessError {
    pub(crate) fn configuration(test: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            test: test.to_owned(),
            reason: reason.into(),
        }
    }

    /// 작성자 실수로 인한 에러인지 확인합니다.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// 타임아웃 계열 에러인지 확인합니다.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StageTimeout { .. } | Self::WaitTimeout { .. })
    }
}
