//! `floot accept`

use anyhow::Result;
use clap::Args;
use floot_common::MAIN;
use std::io::{BufRead, Write};

use super::{Context, EXIT_NEGATIVE, EXIT_OK};
use crate::output::{confirm, print_success};

#[derive(Args, Debug)]
pub struct AcceptArgs {
    /// Run id
    pub id: String,

    /// Accept only this request of the run
    pub request_id: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

pub fn execute(args: AcceptArgs, ctx: &Context, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<i32> {
    let run = ctx.storages.open_run(&args.id)?;
    if let Some(request_id) = &args.request_id {
        if run.metadata().locate(request_id).is_none() || !run.has_blob(request_id) {
            return Err(floot_common::Error::not_found("request", request_id.as_str()).into());
        }
    }

    let question = match &args.request_id {
        Some(request_id) => format!("Accept request {} of run {} into {}?", request_id, args.id, MAIN),
        None => format!("Accept run {} into {}? This overwrites existing responses.", args.id, MAIN),
    };
    if !args.yes && !confirm(&question, input, out)? {
        return Ok(EXIT_NEGATIVE);
    }

    match &args.request_id {
        Some(request_id) => {
            ctx.storages.accept_request(&args.id, request_id)?;
            print_success(out, &format!("Accepted request {} of run {}", request_id, args.id))?;
        }
        None => {
            ctx.storages.accept_run(&args.id)?;
            print_success(out, &format!("Accepted run {}", args.id))?;
        }
    }
    Ok(EXIT_OK)
}
