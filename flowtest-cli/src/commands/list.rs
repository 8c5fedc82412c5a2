//! `flowtest list` command handler

use std::io::Write;

use serde::Serialize;

use flowtest_harness::{SuiteFilter, TestCase, select};

use crate::catalog;
use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub fn execute(args: ListArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let report = build_list(&args)?;
    writer.render(&report)?;
    Ok(())
}

fn build_list(args: &ListArgs) -> Result<CaseList, CliError> {
    let filter = SuiteFilter {
        labels: args.labels.clone(),
        name: None,
    };
    let cases = select(catalog::cases()?, &filter)
        .iter()
        .map(ListedCase::from)
        .collect();
    Ok(CaseList { cases })
}

#[derive(Debug, Serialize)]
struct CaseList {
    cases: Vec<ListedCase>,
}

#[derive(Debug, Serialize)]
struct ListedCase {
    name: String,
    workflow: String,
    labels: Vec<String>,
    serialized: bool,
    hardware_required: bool,
}

impl From<&TestCase> for ListedCase {
    fn from(case: &TestCase) -> Self {
        Self {
            name: case.name().to_owned(),
            workflow: case.workflow_name().to_owned(),
            labels: case.labels().to_vec(),
            serialized: case.decorators().serialized,
            hardware_required: case.options().hardware_required,
        }
    }
}

impl Render for CaseList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "{:<48} {}", "CASE", "LABELS")?;
        writeln!(w, "{}", "-".repeat(80))?;
        for case in &self.cases {
            let mut notes = Vec::new();
            if case.serialized {
                notes.push("serialized");
            }
            if case.hardware_required {
                notes.push("hardware");
            }
            let suffix = if notes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", notes.join(", "))
            };
            writeln!(w, "{:<48} {}{}", case.name, case.labels.join(","), suffix)?;
        }
        writeln!(w, "\n{} cases", self.cases.len())?;
        Ok(())
    }
}
