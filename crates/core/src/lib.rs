//! flowtest 공통 타입
//!
//! 스테이지/상태, 디렉티브 파서, 원격 리소스 모델, 설정, 에러 타입, 메트릭 이름을
//! 정의합니다. 실행 로직은 `flowtest-harness`에 있습니다.

pub mod config;
pub mod directive;
pub mod error;
pub mod metrics;
pub mod resources;
pub mod stage;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, DirectiveError, FlowtestError, StoreError};

// 설정
pub use config::FlowtestConfig;

// 스테이지
pub use stage::{Outcome, Stage};

// 디렉티브
pub use directive::{DirectiveArgs, parse_args};

// 리소스
pub use resources::{ObjectKey, ObjectMeta, ObjectReference, Resource};
