//! Parameter space
//!
//! A parameter declares its values and how often it may occur in a single
//! request. Its combination space is the union of the Cartesian powers
//! `V^min ∪ ... ∪ V^max`: repeats are allowed and order matters.

use serde::Deserialize;

use crate::types::{Combination, Scalar};

/// A declared parameter, values already converted to their canonical text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawParameter")]
pub struct Parameter {
    values: Vec<String>,
    min_occurrence: u32,
    max_occurrence: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameter {
    values: Vec<Scalar>,
    #[serde(default)]
    occurrence: Occurrence,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Occurrence {
    #[serde(default = "default_occurrence")]
    min: u32,
    #[serde(default = "default_occurrence")]
    max: u32,
}

fn default_occurrence() -> u32 {
    1
}

impl Default for Occurrence {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

impl TryFrom<RawParameter> for Parameter {
    type Error = String;

    fn try_from(raw: RawParameter) -> Result<Self, Self::Error> {
        Parameter::new(
            raw.values.iter().map(Scalar::canonical).collect(),
            raw.occurrence.min,
            raw.occurrence.max,
        )
    }
}

impl Parameter {
    pub fn new(values: Vec<String>, min_occurrence: u32, max_occurrence: u32) -> Result<Self, String> {
        if max_occurrence < min_occurrence {
            return Err(format!(
                "occurrence.max ({}) is smaller than occurrence.min ({})",
                max_occurrence, min_occurrence
            ));
        }
        Ok(Self {
            values,
            min_occurrence,
            max_occurrence,
        })
    }

    /// A parameter that occurs exactly once
    pub fn single<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            min_occurrence: 1,
            max_occurrence: 1,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn min_occurrence(&self) -> u32 {
        self.min_occurrence
    }

    pub fn max_occurrence(&self) -> u32 {
        self.max_occurrence
    }

    /// Every value tuple this parameter can contribute, each as a list of
    /// `(name, value)` pairs. Shorter tuples come first, tuples of the same
    /// length are ordered by value position.
    pub fn combinations(&self, name: &str) -> Vec<Combination> {
        let mut out = Vec::new();
        for len in self.min_occurrence..=self.max_occurrence {
            self.push_power(name, len as usize, &mut out);
        }
        out
    }

    fn push_power(&self, name: &str, len: usize, out: &mut Vec<Combination>) {
        if len == 0 {
            out.push(Vec::new());
            return;
        }
        if self.values.is_empty() {
            return;
        }

        // odometer over value indexes, rightmost digit spins fastest
        let n = self.values.len();
        let mut digits = vec![0usize; len];
        loop {
            out.push(
                digits
                    .iter()
                    .map(|&d| (name.to_string(), self.values[d].clone()))
                    .collect(),
            );

            let mut pos = len;
            loop {
                if pos == 0 {
                    return;
                }
                pos -= 1;
                digits[pos] += 1;
                if digits[pos] < n {
                    break;
                }
                digits[pos] = 0;
            }
        }
    }
}
