//! `floot show`

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use floot_common::{RecordedResponse, RunStorage};
use serde::Serialize;
use std::io::Write;

use super::run::format_parameters;
use super::{Context, EXIT_OK};
use crate::output::{print_list, OutputFormat, TableDisplay};

/// How much of every request to print
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Default)]
pub enum Verbosity {
    /// Location and parameters
    Name,
    /// Plus status line and headers
    Header,
    /// Plus the body
    #[default]
    Body,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Run id, or `main`
    pub id: String,

    #[arg(short, long, value_enum, ignore_case = true, default_value_t = Verbosity::Body)]
    pub verbosity: Verbosity,
}

/// One request for the structured formats. Fields beyond the verbosity
/// level are left out.
#[derive(Serialize, Debug)]
pub struct ShownRequest {
    pub testset: String,
    pub endpoint: String,
    pub request_id: String,
    pub parameters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl TableDisplay for ShownRequest {
    fn headers() -> Vec<&'static str> {
        vec!["Testset", "Endpoint", "Request", "Parameters", "Status", "Content-Type"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.testset.clone(),
            self.endpoint.clone(),
            self.request_id.clone(),
            self.parameters.clone(),
            self.status.map(|s| s.to_string()).unwrap_or_default(),
            self.content_type.clone().unwrap_or_default(),
        ]
    }
}

fn is_printable(response: &RecordedResponse) -> bool {
    let content_type = response.content_type().to_ascii_lowercase();
    content_type.contains("text") || content_type.contains("json") || content_type.contains("xml")
}

/// Status line and headers, then the body when `with_body` is set
pub fn print_response(out: &mut dyn Write, response: &RecordedResponse, with_body: bool) -> Result<()> {
    writeln!(out, "  {} {} {}", response.url, response.status, response.reason)?;
    for (name, value) in &response.headers {
        writeln!(out, "  {}: {}", name, value)?;
    }
    if !with_body {
        return Ok(());
    }

    writeln!(out)?;
    if is_printable(response) {
        for line in response.text().lines() {
            writeln!(out, "  {}", line)?;
        }
    } else {
        writeln!(
            out,
            "  <{} bytes of {}>",
            response.body.len(),
            if response.content_type().is_empty() { "unknown content" } else { response.content_type() }
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn collect(storage: &RunStorage, verbosity: Verbosity) -> Result<Vec<ShownRequest>> {
    let mut shown = Vec::new();
    for (testset, endpoints) in &storage.metadata().testsets {
        for (endpoint, requests) in endpoints {
            for (request_id, entry) in requests {
                let mut request = ShownRequest {
                    testset: testset.clone(),
                    endpoint: endpoint.clone(),
                    request_id: request_id.clone(),
                    parameters: format_parameters(&entry.parameters),
                    status: None,
                    content_type: None,
                    body: None,
                };
                if verbosity >= Verbosity::Header {
                    let response = storage.load_blob(request_id)?;
                    request.status = Some(response.status);
                    request.content_type = Some(response.content_type().to_string());
                    if verbosity >= Verbosity::Body && is_printable(&response) {
                        request.body = Some(response.text().into_owned());
                    }
                }
                shown.push(request);
            }
        }
    }
    Ok(shown)
}

pub fn render(out: &mut dyn Write, storage: &RunStorage, verbosity: Verbosity) -> Result<()> {
    let metadata = storage.metadata();
    if let Some(rid) = &metadata.rid {
        writeln!(out, "Run: {}", rid)?;
    }
    if let Some(created) = &metadata.created {
        writeln!(out, "Created: {}", created.to_rfc3339())?;
    }

    for (testset, endpoints) in &metadata.testsets {
        for (endpoint, requests) in endpoints {
            for (request_id, entry) in requests {
                writeln!(out, "{}", format!("{} > {} > {}", testset, endpoint, request_id).bold())?;
                if !entry.parameters.is_empty() {
                    writeln!(out, "  {}", format_parameters(&entry.parameters))?;
                }
                if verbosity < Verbosity::Header {
                    continue;
                }

                let response = storage.load_blob(request_id)?;
                print_response(out, &response, verbosity >= Verbosity::Body)?;
            }
        }
    }
    Ok(())
}

pub fn execute(args: ShowArgs, ctx: &Context, out: &mut dyn Write) -> Result<i32> {
    let storage = ctx.storages.open(&args.id)?;
    match ctx.format {
        OutputFormat::Table => render(out, &storage, args.verbosity)?,
        format => print_list(out, &collect(&storage, args.verbosity)?, format)?,
    }
    Ok(EXIT_OK)
}
