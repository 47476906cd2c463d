//! `floot list`

use anyhow::Result;
use floot_common::RunInfo;
use serde::Serialize;
use std::io::Write;

use super::{Context, EXIT_OK};
use crate::output::{print_list, TableDisplay};

/// Run information for display
#[derive(Serialize, Clone)]
pub struct RunDisplay {
    pub id: String,
    pub created: String,
    pub requests: usize,
}

impl From<RunInfo> for RunDisplay {
    fn from(run: RunInfo) -> Self {
        Self {
            id: run.id,
            created: run
                .created
                .map(|c| c.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            requests: run.requests,
        }
    }
}

impl TableDisplay for RunDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Created", "Requests"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.id.clone(), self.created.clone(), self.requests.to_string()]
    }
}

/// Runs oldest first
pub fn execute(ctx: &Context, out: &mut dyn Write) -> Result<i32> {
    let runs: Vec<RunDisplay> = ctx
        .storages
        .list_runs()?
        .into_iter()
        .map(RunDisplay::from)
        .collect();
    print_list(out, &runs, ctx.format)?;
    Ok(EXIT_OK)
}
