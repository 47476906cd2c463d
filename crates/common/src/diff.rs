//! Diff engine
//!
//! Two metadata trees are partitioned level by level (testset, endpoint,
//! request id) into keys only in `a`, keys only in `b` and shared keys.
//! Exclusive keys are always differences, down to a testset or endpoint that
//! holds no requests at all. Shared requests are compared with
//! the endpoint's named comparator, or with the default comparator that diffs
//! a few header lines and, when the content types allow it, the body.

use serde::Serialize;
use similar::TextDiff;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, ResultExt};
use crate::plugin::{Leaf, Verdict};
use crate::spec::Spec;
use crate::storage::{EndpointTree, RequestEntry, RunStorage, TestsetTree};
use crate::types::{Combination, RecordedResponse};

/// Three-way split of two key sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<K: Ord> {
    pub only_a: BTreeSet<K>,
    pub only_b: BTreeSet<K>,
    pub shared: BTreeSet<K>,
}

pub fn partition<K, A, B>(a: A, b: B) -> Partition<K>
where
    K: Ord + Clone,
    A: IntoIterator<Item = K>,
    B: IntoIterator<Item = K>,
{
    let a: BTreeSet<K> = a.into_iter().collect();
    let b: BTreeSet<K> = b.into_iter().collect();
    Partition {
        only_a: a.difference(&b).cloned().collect(),
        only_b: b.difference(&a).cloned().collect(),
        shared: a.intersection(&b).cloned().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

/// Result of comparing one shared request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeafOutcome {
    pub changed: bool,
    pub report: Vec<String>,
    /// Set when the bodies could not be compared
    pub note: Option<String>,
}

impl From<Verdict> for LeafOutcome {
    fn from(verdict: Verdict) -> Self {
        Self {
            changed: verdict.changed,
            report: verdict.report,
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FindingKind {
    /// The branch exists on one side only. For a request the parameters it
    /// was sent with, empty for a testset or endpoint without requests.
    Exclusive { side: Side, parameters: Combination },
    Shared(LeafOutcome),
}

/// `endpoint` and `request_id` are empty when the finding is about a
/// whole testset or endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub testset: String,
    pub endpoint: String,
    pub request_id: String,
    #[serde(flatten)]
    pub kind: FindingKind,
}

impl Finding {
    fn exclusive(side: Side, testset: &str, endpoint: &str, request_id: &str, parameters: Combination) -> Self {
        Self {
            testset: testset.to_string(),
            endpoint: endpoint.to_string(),
            request_id: request_id.to_string(),
            kind: FindingKind::Exclusive { side, parameters },
        }
    }

    /// `testset > endpoint > request id`, as deep as the finding goes
    pub fn location(&self) -> String {
        [&self.testset, &self.endpoint, &self.request_id]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Exclusive branches always count, shared requests when their comparator says so
    pub fn is_change(&self) -> bool {
        match &self.kind {
            FindingKind::Exclusive { .. } => true,
            FindingKind::Shared(outcome) => outcome.changed,
        }
    }
}

/// Findings of one subtree and whether any of them is a change
#[derive(Debug, Default)]
struct Outcome {
    changed: bool,
    findings: Vec<Finding>,
}

impl Outcome {
    fn push(&mut self, finding: Finding) {
        self.changed |= finding.is_change();
        self.findings.push(finding);
    }

    fn absorb(&mut self, other: Outcome) {
        self.changed |= other.changed;
        self.findings.extend(other.findings);
    }
}

/// Everything `compare` found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    pub a_name: String,
    pub b_name: String,
    pub findings: Vec<Finding>,
    pub changed: bool,
}

impl DiffReport {
    pub fn changes(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_change())
    }

    pub fn side_name(&self, side: Side) -> &str {
        match side {
            Side::A => &self.a_name,
            Side::B => &self.b_name,
        }
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            match &finding.kind {
                FindingKind::Exclusive { side, .. } => {
                    writeln!(f, "Only in {}: {}", self.side_name(*side), finding.location())?
                }
                FindingKind::Shared(outcome) => {
                    if !outcome.changed && outcome.note.is_none() {
                        continue;
                    }
                    writeln!(f, "{}", finding.location())?;
                    for line in &outcome.report {
                        writeln!(f, "{}", line)?;
                    }
                    if let Some(note) = &outcome.note {
                        writeln!(f, "{}", note)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Compare two storages, `a` is the reference side
pub fn compare(spec: &Spec, a: &RunStorage, b: &RunStorage) -> Result<DiffReport> {
    let cmp = Comparison { spec, a, b };
    let ta = &a.metadata().testsets;
    let tb = &b.metadata().testsets;

    let mut outcome = Outcome::default();
    let testsets = partition(ta.keys(), tb.keys());
    for testset in testsets.only_a {
        outcome.absorb(exclusive_testset(Side::A, testset, &ta[testset]));
    }
    for testset in testsets.only_b {
        outcome.absorb(exclusive_testset(Side::B, testset, &tb[testset]));
    }
    for testset in testsets.shared {
        let shared = cmp
            .testset(testset, &ta[testset], &tb[testset])
            .breadcrumb(|| testset.clone())?;
        outcome.absorb(shared);
    }

    Ok(DiffReport {
        a_name: a.name().to_string(),
        b_name: b.name().to_string(),
        findings: outcome.findings,
        changed: outcome.changed,
    })
}

fn exclusive_testset(side: Side, testset: &str, tree: &TestsetTree) -> Outcome {
    let mut outcome = Outcome::default();
    if tree.is_empty() {
        outcome.push(Finding::exclusive(side, testset, "", "", Vec::new()));
    }
    for (endpoint, requests) in tree {
        outcome.absorb(exclusive_endpoint(side, testset, endpoint, requests));
    }
    outcome
}

fn exclusive_endpoint(side: Side, testset: &str, endpoint: &str, tree: &EndpointTree) -> Outcome {
    if tree.is_empty() {
        let mut outcome = Outcome::default();
        outcome.push(Finding::exclusive(side, testset, endpoint, "", Vec::new()));
        return outcome;
    }
    exclusive_requests(side, testset, endpoint, tree)
}

fn exclusive_requests<'t>(
    side: Side,
    testset: &str,
    endpoint: &str,
    requests: impl IntoIterator<Item = (&'t String, &'t RequestEntry)>,
) -> Outcome {
    let mut outcome = Outcome::default();
    for (request_id, entry) in requests {
        outcome.push(Finding::exclusive(side, testset, endpoint, request_id, entry.parameters.clone()));
    }
    outcome
}

struct Comparison<'a> {
    spec: &'a Spec,
    a: &'a RunStorage,
    b: &'a RunStorage,
}

impl Comparison<'_> {
    fn testset(&self, testset: &str, ta: &TestsetTree, tb: &TestsetTree) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        let endpoints = partition(ta.keys(), tb.keys());
        for endpoint in endpoints.only_a {
            outcome.absorb(exclusive_endpoint(Side::A, testset, endpoint, &ta[endpoint]));
        }
        for endpoint in endpoints.only_b {
            outcome.absorb(exclusive_endpoint(Side::B, testset, endpoint, &tb[endpoint]));
        }
        for endpoint in endpoints.shared {
            let shared = self
                .endpoint(testset, endpoint, &ta[endpoint], &tb[endpoint])
                .breadcrumb(|| format!("{} > {}", testset, endpoint))?;
            outcome.absorb(shared);
        }
        Ok(outcome)
    }

    fn endpoint(&self, testset: &str, endpoint: &str, ea: &EndpointTree, eb: &EndpointTree) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        let requests = partition(ea.keys(), eb.keys());
        let only_a = ea.iter().filter(|(id, _)| requests.only_a.contains(id));
        let only_b = eb.iter().filter(|(id, _)| requests.only_b.contains(id));
        outcome.absorb(exclusive_requests(Side::A, testset, endpoint, only_a));
        outcome.absorb(exclusive_requests(Side::B, testset, endpoint, only_b));

        for request_id in requests.shared {
            let leaf = self
                .request(testset, endpoint, request_id)
                .breadcrumb(|| format!("{} > {} > {}", testset, endpoint, request_id))?;
            outcome.push(Finding {
                testset: testset.to_string(),
                endpoint: endpoint.to_string(),
                request_id: request_id.clone(),
                kind: FindingKind::Shared(leaf),
            });
        }
        Ok(outcome)
    }

    fn request(&self, testset: &str, endpoint: &str, request_id: &str) -> Result<LeafOutcome> {
        let a = self.a.load_blob(request_id)?;
        let b = self.b.load_blob(request_id)?;
        let leaf = Leaf {
            testset,
            endpoint,
            request_id,
            a_name: self.a.name(),
            a: &a,
            b_name: self.b.name(),
            b: &b,
        };

        let named = self
            .spec
            .endpoint_for(testset, endpoint)
            .and_then(|e| e.comparator.as_deref());
        match named {
            Some(name) => Ok(self.spec.comparator(name)?.compare(&leaf)?.into()),
            None => Ok(default_compare(&leaf)),
        }
    }
}

fn header_lines(response: &RecordedResponse) -> String {
    format!(
        "Status-Code: {}\nReason: {}\nContent-Type: {}\nConnection: {}\n",
        response.status,
        response.reason,
        response.content_type(),
        response.header("Connection").unwrap_or("")
    )
}

/// Line diff that ignores line endings, so CRLF against LF or a missing
/// final newline is not a difference
fn unified(a: &str, b: &str, context: usize, a_name: &str, b_name: &str) -> Vec<String> {
    let a: Vec<&str> = a.lines().collect();
    let b: Vec<&str> = b.lines().collect();
    TextDiff::from_slices(&a, &b)
        .unified_diff()
        .context_radius(context)
        .header(a_name, b_name)
        .to_string()
        .lines()
        .map(str::to_string)
        .collect()
}

fn is_text(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text") || content_type.contains("json")
}

fn is_zip(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("zip")
}

/// Header lines diffed without context, then the body by content type
pub fn default_compare(leaf: &Leaf<'_>) -> LeafOutcome {
    let mut report = unified(
        &header_lines(leaf.a),
        &header_lines(leaf.b),
        0,
        leaf.a_name,
        leaf.b_name,
    );
    let mut note = None;

    let (ct_a, ct_b) = (leaf.a.content_type(), leaf.b.content_type());
    if is_text(ct_a) && is_text(ct_b) {
        report.extend(unified(&leaf.a.text(), &leaf.b.text(), 3, leaf.a_name, leaf.b_name));
    } else if is_zip(ct_a) && is_zip(ct_b) {
        let (la, lb) = (leaf.a.body.len(), leaf.b.body.len());
        if la != lb {
            report.push(format!("-{}: {} bytes", leaf.a_name, la));
            report.push(format!("+{}: {} bytes", leaf.b_name, lb));
        }
    } else {
        note = Some(format!("Cannot compare content type `{}` with `{}`", ct_a, ct_b));
    }

    LeafOutcome {
        changed: !report.is_empty(),
        report,
        note,
    }
}
