//! CLI Commands

use anyhow::{Context as _, Result};
use floot_common::{Registry, Spec, Storages};
use std::path::Path;
use tracing::debug;

use crate::output::OutputFormat;

pub mod accept;
pub mod cmp;
pub mod list;
pub mod rm;
pub mod run;
pub mod show;

/// Exit code of a successful command
pub const EXIT_OK: i32 = 0;

/// Exit code when differences were found or a confirmation was declined
pub const EXIT_NEGATIVE: i32 = 1;

/// Everything a command works with
pub struct Context {
    pub spec: Spec,
    pub storages: Storages,
    pub format: OutputFormat,
}

impl Context {
    pub fn load(config: &Path, format: OutputFormat) -> Result<Self> {
        let spec = Spec::from_file(config, &Registry::builtin())
            .with_context(|| format!("loading {}", config.display()))?;
        let storages = Storages::new(&spec.storage);
        debug!(config = %config.display(), main = %spec.storage.main.display(), "loaded spec");
        Ok(Self {
            spec,
            storages,
            format,
        })
    }
}
