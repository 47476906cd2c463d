//! Declarative spec document and its resolver
//!
//! The spec is read from YAML once per invocation and never mutated. Named
//! things resolve with the precedence endpoint > testset > global: the most
//! specific definition replaces the less specific one as a whole.
//!
//! ```yaml
//! host: http://localhost:8080
//! storage:
//!   main: store/main
//!   runs: store/runs
//! parameters:
//!   limit:
//!     values: [10, 100]
//! endpoints:
//!   /items:
//!     uses: [limit]
//! testsets:
//!   smoke:
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result, ResultExt};
use crate::params::Parameter;
use crate::plugin::{Comparator, Hook, HookStage, PluginSource, Registry, Transformer};
use crate::strategy::{builtin_strategies, Strategy, DEFAULT_STRATEGY};
use crate::types::{Args, HttpMethod, OrderedMap};

/// Where runs and the baseline live
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub main: PathBuf,
    pub runs: PathBuf,
}

/// Settings applied to every request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestDefaults {
    /// Static headers, values may be `{{variable}}` templates
    #[serde(default)]
    pub header: OrderedMap<String>,
}

/// Strategy selection of an endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyRef {
    pub name: String,
    #[serde(default)]
    pub args: Args,
}

impl Default for StrategyRef {
    fn default() -> Self {
        Self {
            name: DEFAULT_STRATEGY.to_string(),
            args: Args::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    host: String,
    storage: StorageConfig,
    #[serde(default)]
    testsets: OrderedMap<Option<RawTestSet>>,
    #[serde(default)]
    endpoints: OrderedMap<Option<RawEndpoint>>,
    #[serde(default)]
    parameters: OrderedMap<Parameter>,
    hooks: Option<RawHooks>,
    strategies: Option<RawBindings>,
    transformers: Option<RawBindings>,
    comperators: Option<RawBindings>,
    #[serde(default)]
    request: RequestDefaults,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTestSet {
    hooks: Option<RawHooks>,
    #[serde(default)]
    parameters: OrderedMap<Parameter>,
    #[serde(default)]
    endpoints: OrderedMap<Option<RawEndpoint>>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    #[serde(rename = "type", default)]
    method: HttpMethod,
    transformer: Option<String>,
    comperator: Option<String>,
    #[serde(default)]
    uses: Vec<String>,
    #[serde(default)]
    strategy: StrategyRef,
    #[serde(default)]
    parameters: OrderedMap<Parameter>,
    hooks: Option<RawHooks>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHooks {
    source: String,
    before_all: Option<RawHook>,
    before_testset: Option<RawHook>,
    before_endpoint: Option<RawHook>,
    before_request: Option<RawHook>,
    after_request: Option<RawHook>,
    after_endpoint: Option<RawHook>,
    after_testset: Option<RawHook>,
    after_all: Option<RawHook>,
}

impl RawHooks {
    fn get(&self, stage: HookStage) -> Option<&RawHook> {
        match stage {
            HookStage::BeforeAll => self.before_all.as_ref(),
            HookStage::BeforeTestset => self.before_testset.as_ref(),
            HookStage::BeforeEndpoint => self.before_endpoint.as_ref(),
            HookStage::BeforeRequest => self.before_request.as_ref(),
            HookStage::AfterRequest => self.after_request.as_ref(),
            HookStage::AfterEndpoint => self.after_endpoint.as_ref(),
            HookStage::AfterTestset => self.after_testset.as_ref(),
            HookStage::AfterAll => self.after_all.as_ref(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHook {
    #[serde(rename = "use")]
    symbol: String,
    #[serde(default)]
    args: Args,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBindings {
    source: String,
    #[serde(default)]
    names: BTreeMap<String, String>,
}

/// Hooks declared at one level
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: BTreeMap<HookStage, Arc<dyn Hook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: HookStage) -> Option<&Arc<dyn Hook>> {
        self.hooks.get(&stage)
    }

    fn resolve(raw: Option<&RawHooks>, registry: &Registry, path: &str) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::new());
        };
        let source = registry
            .source(&raw.source)
            .breadcrumb(|| format!("{}.source", path))?;

        let mut set = Self::new();
        for stage in HookStage::ALL {
            let Some(hook) = raw.get(stage) else {
                continue;
            };
            let factory = source.hook(&hook.symbol).ok_or_else(|| {
                Error::Spec(format!(
                    "the hook `{}` used at {}.{} does not exist in source `{}`",
                    hook.symbol, path, stage, raw.source
                ))
            })?;
            let built = factory(&hook.args).breadcrumb(|| format!("{}.{}", path, stage))?;
            set.hooks.insert(stage, built);
        }
        Ok(set)
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

/// A resolved endpoint definition
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub transformer: Option<String>,
    pub comparator: Option<String>,
    pub uses: Vec<String>,
    pub strategy: StrategyRef,
    pub parameters: OrderedMap<Parameter>,
    pub hooks: HookSet,
}

impl Endpoint {
    fn resolve(raw: RawEndpoint, registry: &Registry, path: &str) -> Result<Self> {
        Ok(Self {
            method: raw.method,
            transformer: raw.transformer,
            comparator: raw.comperator,
            uses: raw.uses,
            strategy: raw.strategy,
            parameters: raw.parameters,
            hooks: HookSet::resolve(raw.hooks.as_ref(), registry, &format!("{}.hooks", path))?,
        })
    }
}

/// A resolved testset
#[derive(Debug, Clone, Default)]
pub struct TestSet {
    pub parameters: OrderedMap<Parameter>,
    pub endpoints: OrderedMap<Endpoint>,
    pub hooks: HookSet,
}

/// The resolved, immutable spec
pub struct Spec {
    pub host: String,
    pub storage: StorageConfig,
    pub testsets: OrderedMap<TestSet>,
    pub endpoints: OrderedMap<Endpoint>,
    pub parameters: OrderedMap<Parameter>,
    pub hooks: HookSet,
    pub request: RequestDefaults,
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
    transformers: BTreeMap<String, Arc<dyn Transformer>>,
    comparators: BTreeMap<String, Arc<dyn Comparator>>,
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spec")
            .field("host", &self.host)
            .field("storage", &self.storage)
            .field("testsets", &self.testsets.keys().collect::<Vec<_>>())
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field("comparators", &self.comparators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn resolve_endpoints(
    raw: OrderedMap<Option<RawEndpoint>>,
    registry: &Registry,
    path: &str,
) -> Result<OrderedMap<Endpoint>> {
    raw.try_map(|name, endpoint| {
        Endpoint::resolve(endpoint.unwrap_or_default(), registry, &format!("{}.{}", path, name))
    })
}

fn bind<T, F>(
    raw: Option<RawBindings>,
    path: &str,
    registry: &Registry,
    lookup: F,
) -> Result<BTreeMap<String, Arc<T>>>
where
    T: ?Sized,
    F: for<'s> Fn(&'s PluginSource, &str) -> Option<&'s Arc<T>>,
{
    let mut bound = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(bound);
    };
    let source = registry
        .source(&raw.source)
        .breadcrumb(|| format!("{}.source", path))?;
    for (name, symbol) in raw.names {
        let item = lookup(source, &symbol).ok_or_else(|| {
            Error::Spec(format!(
                "`{}` specified at {}.names.{} does not exist in source `{}`",
                symbol, path, name, raw.source
            ))
        })?;
        bound.insert(name, Arc::clone(item));
    }
    Ok(bound)
}

fn absolute(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

impl Spec {
    /// Load a spec file. Relative storage paths resolve against the file's directory.
    pub fn from_file(path: impl AsRef<Path>, registry: &Registry) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Spec(format!("cannot read spec {}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base_dir, registry)
    }

    pub fn from_yaml(yaml: &str, base_dir: &Path, registry: &Registry) -> Result<Self> {
        let raw: RawSpec = serde_yaml::from_str(yaml).map_err(|e| Error::Spec(e.to_string()))?;

        let mut strategies = builtin_strategies();
        strategies.extend(bind(raw.strategies, "strategies", registry, PluginSource::strategy)?);

        let testsets = raw.testsets.try_map(|name, testset| {
            let testset = testset.unwrap_or_default();
            let path = format!("testsets.{}", name);
            Ok::<_, Error>(TestSet {
                parameters: testset.parameters,
                endpoints: resolve_endpoints(testset.endpoints, registry, &format!("{}.endpoints", path))?,
                hooks: HookSet::resolve(testset.hooks.as_ref(), registry, &format!("{}.hooks", path))?,
            })
        })?;

        let spec = Spec {
            host: raw.host,
            storage: StorageConfig {
                main: absolute(base_dir, raw.storage.main),
                runs: absolute(base_dir, raw.storage.runs),
            },
            testsets,
            endpoints: resolve_endpoints(raw.endpoints, registry, "endpoints")?,
            parameters: raw.parameters,
            hooks: HookSet::resolve(raw.hooks.as_ref(), registry, "hooks")?,
            request: raw.request,
            strategies,
            transformers: bind(raw.transformers, "transformers", registry, PluginSource::transformer)?,
            comparators: bind(raw.comperators, "comperators", registry, PluginSource::comparator)?,
        };
        debug!(?spec, "loaded spec");
        Ok(spec)
    }

    /// Endpoints that run inside `testset`: global ones overridden by the testset's
    pub fn endpoints_for(&self, testset: &TestSet) -> OrderedMap<Endpoint> {
        self.endpoints.overlay(&testset.endpoints)
    }

    /// Definition of one endpoint as seen from a testset, if any
    pub fn endpoint_for(&self, testset: &str, endpoint: &str) -> Option<&Endpoint> {
        self.testsets
            .get(testset)
            .and_then(|ts| ts.endpoints.get(endpoint))
            .or_else(|| self.endpoints.get(endpoint))
    }

    /// All parameters visible to an endpoint
    pub fn parameters_for(&self, testset: &TestSet, endpoint: &Endpoint) -> OrderedMap<Parameter> {
        self.parameters
            .overlay(&testset.parameters)
            .overlay(&endpoint.parameters)
    }

    /// The parameters an endpoint `uses`, in declaration order: global
    /// parameters first, then new names from the testset and the endpoint.
    /// The order of `uses` itself does not matter.
    pub fn used_parameters(&self, testset: &TestSet, endpoint: &Endpoint) -> Result<Vec<(String, Parameter)>> {
        let available = self.parameters_for(testset, endpoint);
        let unknown: Vec<&str> = endpoint
            .uses
            .iter()
            .map(String::as_str)
            .filter(|name| !available.contains_key(name))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Run(format!(
                "endpoint uses undefined parameters [{}], available are [{}]",
                unknown.join(", "),
                available.keys().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(available
            .iter()
            .filter(|(name, _)| endpoint.uses.iter().any(|u| u == name))
            .map(|(name, parameter)| (name.to_string(), parameter.clone()))
            .collect())
    }

    /// Strategy by name, spec strategies shadow the built-ins
    pub fn strategy(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies.get(name).cloned().ok_or_else(|| {
            Error::Spec(format!(
                "strategy `{}` is not known. Available are: {}",
                name,
                self.strategies.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn transformer(&self, name: &str) -> Result<&Arc<dyn Transformer>> {
        self.transformers.get(name).ok_or_else(|| {
            Error::Spec(format!("uses the transformer `{}` but it was never defined", name))
        })
    }

    pub fn comparator(&self, name: &str) -> Result<&Arc<dyn Comparator>> {
        self.comparators.get(name).ok_or_else(|| {
            Error::Spec(format!(
                "the comperator `{}` does not exist. Available are: {}",
                name,
                self.comparators.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Hook for a stage: endpoint > testset > global, `None` means no-op
    pub fn hook<'a>(
        &'a self,
        stage: HookStage,
        testset: Option<&'a TestSet>,
        endpoint: Option<&'a Endpoint>,
    ) -> Option<&'a Arc<dyn Hook>> {
        endpoint
            .and_then(|e| e.hooks.get(stage))
            .or_else(|| testset.and_then(|t| t.hooks.get(stage)))
            .or_else(|| self.hooks.get(stage))
    }

    /// Check everything that can be checked before the first request: every
    /// endpoint's parameters and strategy must resolve in every testset.
    pub fn validate(&self) -> Result<()> {
        for (testset_name, testset) in self.testsets.iter() {
            for (endpoint_name, endpoint) in self.endpoints_for(testset).iter() {
                let breadcrumb = || format!("{} > {}", testset_name, endpoint_name);
                self.used_parameters(testset, endpoint).breadcrumb(breadcrumb)?;
                self.strategy(&endpoint.strategy.name).breadcrumb(breadcrumb)?;
            }
        }
        Ok(())
    }
}
