use std::collections::{BTreeMap, BTreeSet};

use keel_canon::{digest_of, CanonError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One term of a program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    #[serde(default = "unit_coef")]
    pub coef: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
}

fn unit_coef() -> f64 {
    1.0
}

impl Term {
    pub fn new(id: impl Into<String>, coef: f64) -> Self {
        Self {
            id: id.into(),
            coef,
            operator_id: None,
        }
    }

    pub fn with_operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = Some(operator_id.into());
        self
    }
}

/// Planning hints carried by the program itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// Canonical intermediate form handed to the planner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramIr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(default)]
    pub terms: Vec<Term>,
    /// Term id to operator id.
    #[serde(default)]
    pub operators: BTreeMap<String, String>,
    #[serde(default)]
    pub invariants: Vec<Value>,
    #[serde(default)]
    pub scheduler_policy: SchedulerPolicy,
}

impl ProgramIr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    pub fn operator(mut self, term_id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        self.operators.insert(term_id.into(), operator_id.into());
        self
    }

    pub fn track(mut self, track: impl Into<String>) -> Self {
        self.scheduler_policy.track = Some(track.into());
        self
    }

    /// The declared program id, or the digest of the canonical IR.
    pub fn resolve_program_id(&self) -> Result<String, CanonError> {
        match &self.program_id {
            Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            _ => Ok(digest_of(self)?.into()),
        }
    }

    /// Operator bound to a term: the operator map wins over the term's own
    /// annotation.
    pub fn operator_for<'a>(&'a self, term: &'a Term) -> Option<&'a str> {
        self.operators
            .get(&term.id)
            .or(term.operator_id.as_ref())
            .map(String::as_str)
    }

    /// Every operator id the program references, sorted.
    pub fn referenced_operators(&self) -> BTreeSet<&str> {
        self.operators
            .values()
            .map(String::as_str)
            .chain(self.terms.iter().filter_map(|t| t.operator_id.as_deref()))
            .collect()
    }
}
