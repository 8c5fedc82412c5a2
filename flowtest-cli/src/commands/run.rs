//! `flowtest run` command handler

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use flowtest_core::FlowtestConfig;
use flowtest_harness::system::{check_reservation, check_triage, hardware_available};
use flowtest_harness::{
    CaseReport, CaseResult, KubectlStore, ResourceStore, RunConfig, SuiteFilter, SuiteOptions,
    run_suite, select,
};

use crate::catalog;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, format_duration};

/// Execute the `run` command against the cluster `kubectl` points at.
pub async fn execute(
    args: RunArgs,
    config: &FlowtestConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let store = Arc::new(KubectlStore::new(&config.cluster.kubectl));
    let summary = run_with_store(store, &args, config).await?;
    writer.render(&summary)?;
    summary.into_result()
}

/// Guards, selects and runs the catalog against `store`.
///
/// Reservation and triage are checked before anything is created.
pub async fn run_with_store<S: ResourceStore>(
    store: Arc<S>,
    args: &RunArgs,
    config: &FlowtestConfig,
) -> Result<RunSummary, CliError> {
    if args.ignore_reservation {
        warn!("ignoring system reservation");
    } else {
        check_reservation(store.as_ref(), &config.cluster.reservation_name).await?;
    }
    check_triage(store.as_ref(), &config.cluster.triage_namespace).await?;

    let hardware = hardware_available(store.as_ref()).await;
    let run = RunConfig::from_config(config)
        .map_err(|e| CliError::Config(e.to_string()))?
        .with_hardware_available(hardware);
    let run_id = run.run_id.clone();

    let filter = SuiteFilter {
        labels: args.labels.clone(),
        name: args.filter.clone(),
    };
    let cases = select(catalog::cases()?, &filter);
    if cases.is_empty() {
        warn!(labels = ?filter.labels, name = ?filter.name, "no cases selected");
    }

    let options = SuiteOptions {
        parallel: usize::from(args.parallel),
        triage_namespace: config
            .cluster
            .mark_triage_on_failure
            .then(|| config.cluster.triage_namespace.clone()),
    };

    let reports = run_suite(store, Arc::new(run), cases, &options).await;
    let summary = RunSummary::new(run_id, reports);
    info!(
        run_id = %summary.run_id,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "suite finished"
    );
    Ok(summary)
}

/// Outcome of one `flowtest run`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub cases: Vec<CaseReport>,
}

impl RunSummary {
    pub fn new(run_id: String, cases: Vec<CaseReport>) -> Self {
        let count = |result: CaseResult| cases.iter().filter(|c| c.result == result).count();
        Self {
            run_id,
            total: cases.len(),
            passed: count(CaseResult::Passed),
            failed: count(CaseResult::Failed),
            skipped: count(CaseResult::Skipped),
            duration: cases.iter().map(|c| c.duration).sum(),
            cases,
        }
    }

    /// `Err` when any case failed, so the process exits non-zero.
    pub fn into_result(self) -> Result<(), CliError> {
        if self.failed > 0 {
            return Err(CliError::CasesFailed {
                failed: self.failed,
                total: self.total,
            });
        }
        Ok(())
    }
}

impl Render for RunSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Run {}", self.run_id)?;
        writeln!(w, "{:<6} {:<48} {:>8}", "RESULT", "CASE", "TIME")?;
        writeln!(w, "{}", "-".repeat(64))?;

        for case in &self.cases {
            let tag = match case.result {
                CaseResult::Passed => "PASS",
                CaseResult::Failed => "FAIL",
                CaseResult::Skipped => "SKIP",
            };
            writeln!(
                w,
                "{:<6} {:<48} {:>8}",
                tag,
                case.name,
                format_duration(case.duration)
            )?;
            if let Some(reason) = &case.skip_reason {
                writeln!(w, "       skipped: {reason}")?;
            }
            if let Some(error) = &case.error {
                writeln!(w, "       error: {error}")?;
            }
            if let Some(error) = &case.cleanup_error {
                writeln!(w, "       cleanup: {error}")?;
            }
        }

        writeln!(w)?;
        writeln!(
            w,
            "{} passed, {} failed, {} skipped of {} ({})",
            self.passed,
            self.failed,
            self.skipped,
            self.total,
            format_duration(self.duration)
        )?;
        Ok(())
    }
}
