//! 메트릭 상수 및 설명 등록
//!
//! 하네스가 기록하는 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 드라이버와 러너는 이 상수로 `metrics::counter!()`, `metrics::histogram!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `flowtest_`
//! - 영역: `stage_`, `case_`, `cleanup_`, `helper_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use flowtest_core::metrics;
//! use metrics::counter;
//!
//! counter!(metrics::CASES_TOTAL, metrics::LABEL_RESULT => "passed").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 스테이지 레이블 키 (Proposal, Setup, ...)
pub const LABEL_STAGE: &str = "stage";

/// 결과 레이블 키 (passed, failed, skipped, completed, error, timeout)
pub const LABEL_RESULT: &str = "result";

/// 리소스 종류 레이블 키 (Workflow, LustreFileSystem, ...)
pub const LABEL_KIND: &str = "kind";

/// 헬퍼 스크립트 레이블 키 (copy-in, copy-out)
pub const LABEL_HELPER: &str = "helper";

// ─── 스테이지 메트릭 ───────────────────────────────────────────────

/// 스테이지 전이 횟수 (counter, label: stage, result)
pub const STAGE_TRANSITIONS_TOTAL: &str = "flowtest_stage_transitions_total";

/// 스테이지 도달 소요 시간 (histogram, 초, label: stage)
pub const STAGE_DURATION_SECONDS: &str = "flowtest_stage_duration_seconds";

/// 스테이지 타임아웃 횟수 (counter, label: stage)
pub const STAGE_TIMEOUTS_TOTAL: &str = "flowtest_stage_timeouts_total";

// ─── 케이스 메트릭 ─────────────────────────────────────────────────

/// 실행된 케이스 수 (counter, label: result)
pub const CASES_TOTAL: &str = "flowtest_cases_total";

/// 케이스 하나의 전체 소요 시간 (histogram, 초)
pub const CASE_DURATION_SECONDS: &str = "flowtest_case_duration_seconds";

/// 현재 실행 중인 케이스 수 (gauge)
pub const CASES_RUNNING: &str = "flowtest_cases_running";

// ─── 정리 / 헬퍼 메트릭 ─────────────────────────────────────────────

/// 정리 단계 실패 수 (counter, label: kind)
pub const CLEANUP_FAILURES_TOTAL: &str = "flowtest_cleanup_failures_total";

/// 실행된 헬퍼 파드 수 (counter, label: helper, result)
pub const HELPER_PODS_TOTAL: &str = "flowtest_helper_pods_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 스테이지 소요 시간 버킷 (초)
///
/// 1s ~ 30m 범위. Setup/Teardown은 수 분이 걸립니다.
pub const STAGE_DURATION_BUCKETS: [f64; 10] = [
    1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다. `flowtest run --metrics`가
/// 엔드포인트를 연 직후에 호출합니다.
pub fn describe_all() {
    use ::metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        STAGE_TRANSITIONS_TOTAL,
        "Workflow stage transitions by stage and result"
    );
    describe_histogram!(
        STAGE_DURATION_SECONDS,
        "Time from desired-state write to the stage being reached, in seconds"
    );
    describe_counter!(
        STAGE_TIMEOUTS_TOTAL,
        "Stage waits that exceeded their timeout tier"
    );

    describe_counter!(CASES_TOTAL, "Test cases run, by result");
    describe_histogram!(
        CASE_DURATION_SECONDS,
        "Wall time of one test case including prepare and cleanup, in seconds"
    );
    describe_gauge!(CASES_RUNNING, "Test cases currently executing");

    describe_counter!(
        CLEANUP_FAILURES_TOTAL,
        "Cleanup steps that failed, by resource kind"
    );
    describe_counter!(
        HELPER_PODS_TOTAL,
        "Helper pods launched, by helper script and result"
    );
}
