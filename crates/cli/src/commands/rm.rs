//! `floot rm`

use anyhow::Result;
use clap::Args;
use std::io::{BufRead, Write};

use super::{Context, EXIT_NEGATIVE, EXIT_OK};
use crate::output::{confirm, print_success};

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Run id
    pub id: String,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

pub fn execute(args: RmArgs, ctx: &Context, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<i32> {
    // fail on a missing run before asking
    ctx.storages.open_run(&args.id)?;

    let question = format!("Remove run {}?", args.id);
    if !args.yes && !confirm(&question, input, out)? {
        return Ok(EXIT_NEGATIVE);
    }
    ctx.storages.remove_run(&args.id)?;
    print_success(out, &format!("Removed run {}", args.id))?;
    Ok(EXIT_OK)
}
