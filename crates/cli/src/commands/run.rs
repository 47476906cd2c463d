//! `floot run`

use anyhow::Result;
use clap::Args;
use floot_common::Combination;
use floot_runner::{EndpointSummary, Executor, HttpTransport, RunSummary};
use serde::Serialize;
use std::io::Write;

use super::{Context, EXIT_OK};
use crate::output::{print_info, print_list, print_section, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only print the id of the new run
    #[arg(long)]
    pub id_only: bool,
}

/// One executed request for display
#[derive(Serialize, Clone)]
pub struct RequestDisplay {
    pub testset: String,
    pub endpoint: String,
    pub method: String,
    pub request_id: String,
    pub parameters: Combination,
    pub status: u16,
}

impl TableDisplay for RequestDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Request", "Parameters", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.request_id.clone(),
            format_parameters(&self.parameters),
            self.status.to_string(),
        ]
    }
}

/// `name=value` pairs in request order
pub fn format_parameters(parameters: &Combination) -> String {
    parameters
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn endpoint_rows(endpoint: &EndpointSummary) -> Vec<RequestDisplay> {
    endpoint
        .requests
        .iter()
        .map(|request| RequestDisplay {
            testset: endpoint.testset.clone(),
            endpoint: endpoint.endpoint.clone(),
            method: endpoint.method.to_string(),
            request_id: request.request_id.clone(),
            parameters: request.parameters.clone(),
            status: request.status,
        })
        .collect()
}

/// Render a finished run, one table per endpoint for the table format
pub fn render(out: &mut dyn Write, summary: &RunSummary, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Table {
        let rows: Vec<RequestDisplay> = summary.endpoints.iter().flat_map(endpoint_rows).collect();
        return print_list(out, &rows, format);
    }
    if summary.endpoints.is_empty() {
        print_info(out, "No testsets to run")?;
    }
    for endpoint in &summary.endpoints {
        let title = format!("{} > {} {}", endpoint.testset, endpoint.method, endpoint.endpoint);
        print_section(out, &title, &endpoint_rows(endpoint))?;
    }
    Ok(())
}

pub async fn execute(args: RunArgs, ctx: &Context, out: &mut dyn Write) -> Result<i32> {
    let transport = HttpTransport::new()?;
    let executor = Executor::create(&ctx.spec, &ctx.storages, &transport)?;

    // the id comes first so an aborted run can still be inspected
    writeln!(out, "{}", executor.run_id())?;
    out.flush()?;

    let summary = executor.run().await?;
    if !args.id_only {
        render(out, &summary, ctx.format)?;
    }
    Ok(EXIT_OK)
}
