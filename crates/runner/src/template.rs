//! `{{variable}}` templates
//!
//! Only a value that is exactly one template is replaced. Anything else,
//! including text around a template, is sent verbatim.

use floot_common::{Combination, Variables};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{(\w+)\}\}$").expect("template pattern is a valid regex"));

/// Replace a whole-value template. Unknown variables become an empty string.
pub fn interpolate(value: &str, variables: &Variables) -> String {
    let Some(captures) = TEMPLATE.captures(value) else {
        return value.to_string();
    };
    let name = &captures[1];
    match variables.get(name) {
        Some(resolved) => resolved.clone(),
        None => {
            warn!(variable = name, "unknown template variable, substituting an empty string");
            String::new()
        }
    }
}

/// Interpolate every `/`-separated segment of a path
pub fn interpolate_path(path: &str, variables: &Variables) -> String {
    path.split('/')
        .map(|segment| interpolate(segment, variables))
        .collect::<Vec<_>>()
        .join("/")
}

/// Interpolate the values of a combination, names stay as they are
pub fn interpolate_pairs(combination: &Combination, variables: &Variables) -> Combination {
    combination
        .iter()
        .map(|(name, value)| (name.clone(), interpolate(value, variables)))
        .collect()
}
