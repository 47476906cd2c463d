//! Plugin contracts and the registry they are resolved from
//!
//! Hooks, transformers, comparators and strategies are compiled in. A spec
//! block such as
//!
//! ```yaml
//! transformers:
//!   source: std
//!   names:
//!     pretty: pretty_json
//! ```
//!
//! binds the spec-local name `pretty` to the symbol `pretty_json` exported by
//! the registered source `std`. Unknown sources and symbols are spec errors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::builtin;
use crate::error::{Error, Result};
use crate::strategy::Strategy;
use crate::types::{Args, Combination, RecordedResponse, Variables};

/// Where in the run a hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HookStage {
    BeforeAll,
    BeforeTestset,
    BeforeEndpoint,
    BeforeRequest,
    AfterRequest,
    AfterEndpoint,
    AfterTestset,
    AfterAll,
}

impl HookStage {
    pub const ALL: [HookStage; 8] = [
        HookStage::BeforeAll,
        HookStage::BeforeTestset,
        HookStage::BeforeEndpoint,
        HookStage::BeforeRequest,
        HookStage::AfterRequest,
        HookStage::AfterEndpoint,
        HookStage::AfterTestset,
        HookStage::AfterAll,
    ];

    /// Key of the stage in a `hooks` block
    pub fn key(&self) -> &'static str {
        match self {
            HookStage::BeforeAll => "before_all",
            HookStage::BeforeTestset => "before_testset",
            HookStage::BeforeEndpoint => "before_endpoint",
            HookStage::BeforeRequest => "before_request",
            HookStage::AfterRequest => "after_request",
            HookStage::AfterEndpoint => "after_endpoint",
            HookStage::AfterTestset => "after_testset",
            HookStage::AfterAll => "after_all",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a hook is told about its position in the run. Fields that do not
/// apply to the stage are `None`.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub stage: HookStage,
    pub testset: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub combination: Option<&'a Combination>,
}

impl<'a> HookContext<'a> {
    pub fn new(stage: HookStage) -> Self {
        Self {
            stage,
            testset: None,
            endpoint: None,
            combination: None,
        }
    }

    pub fn testset(mut self, testset: &'a str) -> Self {
        self.testset = Some(testset);
        self
    }

    pub fn endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn combination(mut self, combination: &'a Combination) -> Self {
        self.combination = Some(combination);
        self
    }
}

/// Runs at one of the [`HookStage`]s and may change the run variables
pub trait Hook: Send + Sync {
    fn call(&self, ctx: &HookContext<'_>, variables: &mut Variables) -> Result<()>;
}

/// Builds a hook from the `args` written next to it in the spec
pub type HookFactory = Arc<dyn Fn(&Args) -> Result<Arc<dyn Hook>> + Send + Sync>;

/// Rewrites a response before it is stored
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        testset: &str,
        endpoint: &str,
        response: RecordedResponse,
    ) -> Result<RecordedResponse>;
}

/// One shared request as seen by a comparator
#[derive(Debug, Clone, Copy)]
pub struct Leaf<'a> {
    pub testset: &'a str,
    pub endpoint: &'a str,
    pub request_id: &'a str,
    pub a_name: &'a str,
    pub a: &'a RecordedResponse,
    pub b_name: &'a str,
    pub b: &'a RecordedResponse,
}

/// Verdict of a comparator. `changed` is authoritative, an empty report does
/// not imply "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub changed: bool,
    pub report: Vec<String>,
}

impl Verdict {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn changed(report: Vec<String>) -> Self {
        Self {
            changed: true,
            report,
        }
    }
}

/// Custom equivalence for one endpoint's shared requests
pub trait Comparator: Send + Sync {
    fn compare(&self, leaf: &Leaf<'_>) -> Result<Verdict>;
}

/// The symbols one source exports
#[derive(Clone, Default)]
pub struct PluginSource {
    hooks: BTreeMap<String, HookFactory>,
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
    transformers: BTreeMap<String, Arc<dyn Transformer>>,
    comparators: BTreeMap<String, Arc<dyn Comparator>>,
}

impl PluginSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Args) -> Result<Arc<dyn Hook>> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with_strategy(mut self, name: impl Into<String>, strategy: impl Strategy + 'static) -> Self {
        self.strategies.insert(name.into(), Arc::new(strategy));
        self
    }

    pub fn with_transformer(
        mut self,
        name: impl Into<String>,
        transformer: impl Transformer + 'static,
    ) -> Self {
        self.transformers.insert(name.into(), Arc::new(transformer));
        self
    }

    pub fn with_comparator(
        mut self,
        name: impl Into<String>,
        comparator: impl Comparator + 'static,
    ) -> Self {
        self.comparators.insert(name.into(), Arc::new(comparator));
        self
    }

    pub fn hook(&self, symbol: &str) -> Option<&HookFactory> {
        self.hooks.get(symbol)
    }

    pub fn strategy(&self, symbol: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(symbol)
    }

    pub fn transformer(&self, symbol: &str) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(symbol)
    }

    pub fn comparator(&self, symbol: &str) -> Option<&Arc<dyn Comparator>> {
        self.comparators.get(symbol)
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSource")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field("comparators", &self.comparators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Named plugin sources a spec may refer to
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sources: BTreeMap<String, PluginSource>,
}

impl Registry {
    /// A registry without any source
    pub fn empty() -> Self {
        Self::default()
    }

    /// The registry with the compiled-in `std` source
    pub fn builtin() -> Self {
        Self::empty().register(builtin::SOURCE_NAME, builtin::source())
    }

    pub fn register(mut self, name: impl Into<String>, source: PluginSource) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    pub fn source(&self, name: &str) -> Result<&PluginSource> {
        self.sources.get(name).ok_or_else(|| {
            Error::Spec(format!(
                "plugin source `{}` is not registered. Available are: {}",
                name,
                self.sources.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}
