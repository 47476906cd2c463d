//! floot common library
//!
//! Spec model and resolver, parameter space, strategies, request identity,
//! plugin registry, run storage and the diff engine.

pub mod builtin;
pub mod diff;
pub mod error;
pub mod identity;
pub mod params;
pub mod plugin;
pub mod spec;
pub mod storage;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use diff::{compare, DiffReport, Finding, FindingKind, LeafOutcome, Side};
pub use error::{Error, Result, ResultExt};
pub use identity::request_id;
pub use params::Parameter;
pub use plugin::{
    Comparator, Hook, HookContext, HookStage, Leaf, PluginSource, Registry, Transformer, Verdict,
};
pub use spec::{Endpoint, Spec, TestSet};
pub use storage::{Metadata, RunInfo, RunStorage, Storages, MAIN};
pub use strategy::{Strategy, DEFAULT_STRATEGY};
pub use types::*;

/// floot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Spec file looked up when no `--config` is given
pub const DEFAULT_SPEC_FILE: &str = "floot.yaml";
