//! 케이스 선택과 스위트 실행
//!
//! 선언된 케이스를 확장하고 필터링한 뒤, 직렬화되지 않은 케이스는 제한된
//! 병렬도로, 직렬화된 케이스는 하나씩 실행합니다.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::case::TestCase;
use crate::iterator::TestIterator;
use crate::run_config::RunConfig;
use crate::runner::{CaseReport, run_case};
use crate::store::ResourceStore;
use crate::system::mark_triage;

/// Which cases to run.
#[derive(Debug, Clone, Default)]
pub struct SuiteFilter {
    /// A case must carry every one of these labels.
    pub labels: Vec<String>,
    /// Case-insensitive substring of the case name.
    pub name: Option<String>,
}

impl SuiteFilter {
    pub fn matches(&self, case: &TestCase) -> bool {
        let labelled = self.labels.iter().all(|l| case.has_label(l));
        let named = self.name.as_ref().is_none_or(|needle| {
            case.name()
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        labelled && named
    }
}

/// Expands duplicates and applies the focus, pending and filter rules.
///
/// When any case is focused only focused cases remain. Pending cases never run.
pub fn select(cases: Vec<TestCase>, filter: &SuiteFilter) -> Vec<TestCase> {
    let expanded: Vec<TestCase> = TestIterator::new(cases).collect();
    let any_focused = expanded.iter().any(|c| c.decorators().focused);

    expanded
        .into_iter()
        .filter(|c| !c.decorators().pending)
        .filter(|c| !any_focused || c.decorators().focused)
        .filter(|c| filter.matches(c))
        .collect()
}

/// How a suite runs.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Maximum non-serialized cases in flight.
    pub parallel: usize,
    /// Namespace created after the first failure, if any.
    pub triage_namespace: Option<String>,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            parallel: 1,
            triage_namespace: None,
        }
    }
}

/// Runs the selected cases and returns their reports in selection order.
pub async fn run_suite<S: ResourceStore>(
    store: Arc<S>,
    run: Arc<RunConfig>,
    cases: Vec<TestCase>,
    options: &SuiteOptions,
) -> Vec<CaseReport> {
    let total = cases.len();
    let (serialized, parallel): (Vec<_>, Vec<_>) = cases
        .into_iter()
        .enumerate()
        .partition(|(_, c)| c.decorators().serialized);

    info!(
        total,
        parallel = parallel.len(),
        serialized = serialized.len(),
        run_id = %run.run_id,
        "starting suite"
    );

    let mut reports: Vec<Option<CaseReport>> = (0..total).map(|_| None).collect();
    let semaphore = Arc::new(Semaphore::new(options.parallel.max(1)));
    let mut tasks = JoinSet::new();

    for (index, case) in parallel {
        let store = Arc::clone(&store);
        let run = Arc::clone(&run);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // 세마포어는 닫지 않으므로 acquire는 실패하지 않음
            let _permit = semaphore.acquire_owned().await.ok();
            (index, run_case(store.as_ref(), &run, case).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => {
                note_failure(store.as_ref(), options, &report).await;
                reports[index] = Some(report);
            }
            Err(e) => error!(error = %e, "test task panicked"),
        }
    }

    for (index, case) in serialized {
        let report = run_case(store.as_ref(), &run, case).await;
        note_failure(store.as_ref(), options, &report).await;
        reports[index] = Some(report);
    }

    reports.into_iter().flatten().collect()
}

async fn note_failure<S: ResourceStore>(store: &S, options: &SuiteOptions, report: &CaseReport) {
    if !report.failed() {
        return;
    }
    if let Some(namespace) = &options.triage_namespace {
        if let Err(e) = mark_triage(store, namespace).await {
            warn!(namespace = %namespace, error = %e, "failed to mark system for triage");
        }
    }
}
