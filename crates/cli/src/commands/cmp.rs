//! `floot cmp`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use floot_common::{compare, DiffReport, FindingKind, RunStorage, Side, MAIN};
use std::io::Write;

use super::run::format_parameters;
use super::show::print_response;
use super::{Context, EXIT_NEGATIVE, EXIT_OK};
use crate::output::{diff_line, print_success, print_warning, OutputFormat};

#[derive(Args, Debug)]
pub struct CmpArgs {
    /// Run id, or `main`. Compared against the baseline when `b` is omitted.
    pub a: String,

    /// Run id, or `main`
    pub b: Option<String>,

    /// Only name what differs
    #[arg(long)]
    pub brief: bool,
}

/// Human-readable report. Outside brief mode a request that exists on one
/// side only is printed with its stored response.
pub fn render(
    out: &mut dyn Write,
    report: &DiffReport,
    a: &RunStorage,
    b: &RunStorage,
    brief: bool,
) -> Result<()> {
    for finding in &report.findings {
        let location = finding.location();
        match &finding.kind {
            FindingKind::Exclusive { side, parameters } => {
                let line = format!("Only in {}: {}", report.side_name(*side), location);
                writeln!(out, "{}", line.yellow())?;
                if brief || finding.request_id.is_empty() {
                    continue;
                }
                if !parameters.is_empty() {
                    writeln!(out, "  {}", format_parameters(parameters))?;
                }
                let storage = match side {
                    Side::A => a,
                    Side::B => b,
                };
                print_response(out, &storage.load_blob(&finding.request_id)?, true)?;
            }
            FindingKind::Shared(outcome) if outcome.changed => {
                if brief {
                    writeln!(out, "Differs: {}", location)?;
                    continue;
                }
                writeln!(out, "{}", location.bold())?;
                for line in &outcome.report {
                    writeln!(out, "{}", diff_line(line))?;
                }
                if let Some(note) = &outcome.note {
                    print_warning(out, note)?;
                }
            }
            FindingKind::Shared(outcome) => {
                if let (Some(note), false) = (&outcome.note, brief) {
                    print_warning(out, &format!("{}: {}", location, note))?;
                }
            }
        }
    }

    if report.changed {
        let summary = format!(
            "{} difference(s) between {} and {}",
            report.changes().count(),
            report.a_name,
            report.b_name
        );
        writeln!(out, "{}", summary.red())?;
    } else {
        print_success(
            out,
            &format!("No differences between {} and {}", report.a_name, report.b_name),
        )?;
    }
    Ok(())
}

/// One line per difference, tab separated
fn render_plain(out: &mut dyn Write, report: &DiffReport) -> Result<()> {
    for finding in report.changes() {
        let status = match &finding.kind {
            FindingKind::Exclusive { side, .. } => format!("only in {}", report.side_name(*side)),
            FindingKind::Shared(_) => "differs".to_string(),
        };
        writeln!(out, "{}\t{}", status, finding.location())?;
    }
    Ok(())
}

pub fn execute(args: CmpArgs, ctx: &Context, out: &mut dyn Write) -> Result<i32> {
    let (a, b) = match &args.b {
        Some(b) => (ctx.storages.open(&args.a)?, ctx.storages.open(b)?),
        None => (ctx.storages.open(MAIN)?, ctx.storages.open(&args.a)?),
    };
    let report = compare(&ctx.spec, &a, &b)?;
    match ctx.format {
        OutputFormat::Table => render(out, &report, &a, &b, args.brief)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(&report)?)?,
        OutputFormat::Plain => render_plain(out, &report)?,
    }
    Ok(if report.changed { EXIT_NEGATIVE } else { EXIT_OK })
}
