//! Strategy engine
//!
//! A strategy turns the resolved parameters of one endpoint into the list of
//! parameter combinations to request.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::params::Parameter;
use crate::types::{Args, Combination, Variables};

/// Name of the strategy used when an endpoint does not pick one
pub const DEFAULT_STRATEGY: &str = "permutations";

/// Produces the combinations for one endpoint
pub trait Strategy: Send + Sync {
    /// `parameters` are the endpoint's used parameters, in declaration order
    fn generate(
        &self,
        testset: &str,
        endpoint: &str,
        variables: &Variables,
        args: &Args,
        parameters: &[(String, Parameter)],
    ) -> Result<Vec<Combination>>;
}

/// Every combination of every parameter: the Cartesian product of the
/// per-parameter combination spaces, flattened into one pair list each.
#[derive(Debug, Default, Clone, Copy)]
pub struct Permutations;

impl Strategy for Permutations {
    fn generate(
        &self,
        _testset: &str,
        _endpoint: &str,
        _variables: &Variables,
        _args: &Args,
        parameters: &[(String, Parameter)],
    ) -> Result<Vec<Combination>> {
        Ok(permutations(parameters))
    }
}

/// Cartesian product across parameters. With no parameters this is a single
/// empty combination, i.e. one request without query parameters.
pub fn permutations(parameters: &[(String, Parameter)]) -> Vec<Combination> {
    let mut product: Vec<Combination> = vec![Vec::new()];
    for (name, parameter) in parameters {
        let choices = parameter.combinations(name);
        let mut next = Vec::with_capacity(product.len() * choices.len());
        for prefix in &product {
            for choice in &choices {
                let mut combination = prefix.clone();
                combination.extend(choice.iter().cloned());
                next.push(combination);
            }
        }
        product = next;
    }
    product
}

/// Strategies that are always available, spec strategies may replace them
pub fn builtin_strategies() -> BTreeMap<String, Arc<dyn Strategy>> {
    let mut strategies: BTreeMap<String, Arc<dyn Strategy>> = BTreeMap::new();
    strategies.insert(DEFAULT_STRATEGY.to_string(), Arc::new(Permutations));
    strategies
}
