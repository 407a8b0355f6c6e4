use std::collections::BTreeSet;
use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use rescat::hooks::{Outcome, ResourceReport};
use rescat::{Error, ScriptChecker, ValidationReport};

use super::{output, Context};
use crate::cli::CheckArgs;

pub fn run(ctx: &Context, args: &CheckArgs) -> Result<ExitCode> {
    let mut hooks = ctx.hooks()?;
    for path in &args.checkers {
        hooks = hooks.checker(ScriptChecker::load(path)?);
    }
    let collection = ctx.load(&args.load, hooks.clone())?;

    let report = match hooks.validate(&collection) {
        Ok(report) => report,
        Err(Error::NoCheckers) => {
            eprintln!("No checkers. Use --checker or RESCAT_CHECKERS to specify a checker.");
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(err.into()),
    };

    let mut out = output(args.out.as_deref())?;
    out.write_all(render(&report, ctx.verbose, args.quiet).as_bytes())?;
    out.flush()?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Checker indices that produced verdicts, and those that rejected.
fn tally(entry: &ResourceReport) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let checked = entry.findings().iter().map(|f| f.checker).collect();
    let rejected = entry
        .findings()
        .iter()
        .filter(|f| !f.verdict.accepted)
        .map(|f| f.checker)
        .collect();
    (checked, rejected)
}

fn render(report: &ValidationReport, verbose: bool, quiet: bool) -> String {
    let mut text = String::from("Checkers:\n");
    for (i, name) in report.checkers().iter().enumerate() {
        text.push_str(&format!("\t[{}]\t{}\n", i, name));
    }
    text.push('\n');

    let total = report.len();
    for (i, entry) in report.iter().enumerate() {
        let (checked, rejected) = tally(entry);
        if !quiet {
            let summary = match entry.outcome() {
                Outcome::Ok => format!("OK ({} checked)", checked.len()),
                Outcome::Unmatched => "UNMATCHED".to_string(),
                Outcome::Rejected => format!(
                    "ERROR ({} error / {} checked)",
                    rejected.len(),
                    checked.len()
                ),
            };
            text.push_str(&format!(
                "[{:3} / {:3}] {:<30} {}\n",
                i + 1,
                total,
                entry.resource(),
                summary
            ));
        }
        if verbose || !entry.outcome().is_ok() {
            for checker in 0..report.checkers().len() {
                let findings: Vec<_> = entry
                    .findings()
                    .iter()
                    .filter(|f| f.checker == checker)
                    .collect();
                if findings.is_empty() {
                    if verbose {
                        text.push_str(&format!("\t[{}]\tUNMATCHED\n", checker));
                    }
                    continue;
                }
                for finding in findings {
                    if !finding.verdict.accepted {
                        text.push_str(&format!(
                            "\t[{}]\t{}\n",
                            checker, finding.verdict.message
                        ));
                    } else if verbose {
                        text.push_str(&format!(
                            "\t[{}]\tOK: {}\n",
                            checker, finding.verdict.message
                        ));
                    }
                }
            }
        }
    }

    text.push('\n');
    let failures: Vec<&str> = report.failures().map(|r| r.resource()).collect();
    if failures.is_empty() {
        text.push_str("ALL RESOURCES OK\n");
    } else {
        text.push_str(&format!("PROBLEMATIC RESOURCES: {}\n", failures.join(" ")));
    }
    text
}
