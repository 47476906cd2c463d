//! The compiled-in `std` plugin source
//!
//! | kind | symbol | what it does |
//! |---|---|---|
//! | hook | `set_vars` | copies its `args` into the run variables |
//! | hook | `log` | logs the stage, testset and endpoint it fires at |
//! | strategy | `sample` | `permutations`, truncated to `args.limit` combinations |
//! | transformer | `pretty_json` | re-renders JSON bodies with sorted keys, one value per line |
//! | comparator | `status_only` | changed iff the status codes differ |
//! | comparator | `exact_body` | changed iff the bodies differ byte-wise |

use std::sync::Arc;

use tracing::info;

use crate::error::{Error, Result};
use crate::params::Parameter;
use crate::plugin::{Comparator, Hook, HookContext, Leaf, PluginSource, Transformer, Verdict};
use crate::strategy::{permutations, Strategy};
use crate::types::{Args, Combination, RecordedResponse, Scalar, Variables};

pub const SOURCE_NAME: &str = "std";

pub fn source() -> PluginSource {
    PluginSource::new()
        .with_hook("set_vars", |args: &Args| {
            Ok(Arc::new(SetVars::from_args(args)?) as Arc<dyn Hook>)
        })
        .with_hook("log", |_args: &Args| Ok(Arc::new(LogStage) as Arc<dyn Hook>))
        .with_strategy("sample", Sample)
        .with_transformer("pretty_json", PrettyJson)
        .with_comparator("status_only", StatusOnly)
        .with_comparator("exact_body", ExactBody)
}

/// Sets fixed run variables
pub struct SetVars {
    values: Vec<(String, String)>,
}

impl SetVars {
    fn from_args(args: &Args) -> Result<Self> {
        let mut values = Vec::with_capacity(args.len());
        for (name, value) in args {
            let scalar: Scalar = serde_yaml::from_value(value.clone()).map_err(|_| {
                Error::Spec(format!("set_vars: value of `{}` must be a scalar", name))
            })?;
            values.push((name.clone(), scalar.canonical()));
        }
        Ok(Self { values })
    }
}

impl Hook for SetVars {
    fn call(&self, _ctx: &HookContext<'_>, variables: &mut Variables) -> Result<()> {
        for (name, value) in &self.values {
            variables.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

struct LogStage;

impl Hook for LogStage {
    fn call(&self, ctx: &HookContext<'_>, _variables: &mut Variables) -> Result<()> {
        info!(
            stage = %ctx.stage,
            testset = ctx.testset.unwrap_or("-"),
            endpoint = ctx.endpoint.unwrap_or("-"),
            "hook"
        );
        Ok(())
    }
}

struct Sample;

impl Strategy for Sample {
    fn generate(
        &self,
        _testset: &str,
        _endpoint: &str,
        _variables: &Variables,
        args: &Args,
        parameters: &[(String, Parameter)],
    ) -> Result<Vec<Combination>> {
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Spec("sample strategy needs a non-negative integer `limit`".into()))?;

        let mut combinations = permutations(parameters);
        combinations.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(combinations)
    }
}

struct PrettyJson;

impl Transformer for PrettyJson {
    fn transform(
        &self,
        _testset: &str,
        _endpoint: &str,
        mut response: RecordedResponse,
    ) -> Result<RecordedResponse> {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
            response.body = serde_json::to_vec_pretty(&value)?;
        }
        Ok(response)
    }
}

struct StatusOnly;

impl Comparator for StatusOnly {
    fn compare(&self, leaf: &Leaf<'_>) -> Result<Verdict> {
        if leaf.a.status == leaf.b.status {
            return Ok(Verdict::unchanged());
        }
        Ok(Verdict::changed(vec![
            format!("-{}: {}", leaf.a_name, leaf.a.status),
            format!("+{}: {}", leaf.b_name, leaf.b.status),
        ]))
    }
}

struct ExactBody;

impl Comparator for ExactBody {
    fn compare(&self, leaf: &Leaf<'_>) -> Result<Verdict> {
        if leaf.a.body == leaf.b.body {
            return Ok(Verdict::unchanged());
        }
        Ok(Verdict::changed(vec![format!(
            "body differs: {} has {} bytes, {} has {} bytes",
            leaf.a_name,
            leaf.a.body.len(),
            leaf.b_name,
            leaf.b.body.len()
        )]))
    }
}
