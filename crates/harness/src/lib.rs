//! flowtest 하네스
//!
//! 테스트 케이스 선언, 워크플로 스테이지 구동, 보조 리소스 준비/정리,
//! 케이스 확장과 스위트 실행을 담당합니다.
//!
//! # 실행 흐름
//!
//! ```text
//! TestIterator ─▶ prepare ─▶ create_workflow ─▶ execute ─▶ teardown ─▶ cleanup
//!                    │                             │
//!                    ▼                             ▼
//!              profiles, persistent,         allocator (Setup),
//!              MGS pool, global mount        copy-out helper (DataOut)
//! ```
//!
//! 모든 원격 접근은 [`ResourceStore`]를 통합니다.

pub mod allocator;
pub mod case;
pub mod driver;
pub mod error;
pub mod helper;
pub mod iterator;
pub mod preparer;
pub mod run_config;
pub mod runner;
pub mod store;
pub mod suite;
pub mod system;

mod wait;

// --- 주요 타입 re-export ---

pub use case::{ContainerProfileOverrides, Decorators, TestCase, TestOptions};
pub use driver::{ExecutionOutcome, ExecutionReport, StageVisit, StateDriver};
pub use error::{Expectation, HarnessError, Observed};
pub use iterator::TestIterator;
pub use preparer::{PrepareOutcome, cleanup, prepare};
pub use run_config::RunConfig;
pub use runner::{Assertion, AssertionKind, CaseReport, CaseResult, run_case};
pub use store::{KubectlStore, MemoryStore, ResourceStore};
pub use suite::{SuiteFilter, SuiteOptions, run_suite, select};
