//! Query request shapes: templates, boolean op trees, and query kinds.

use serde::{Deserialize, Serialize};

/// A triple-pattern filter: any subset of fields may be populated, the
/// rest are wildcards. Mirrors the optional-field shape of [`Triple`](crate::Triple)
/// itself, minus `sig` and `created` which are never matched on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl TripleTemplate {
    pub fn with_subj(subj: impl Into<String>) -> Self {
        Self {
            subj: Some(subj.into()),
            ..Default::default()
        }
    }
}

/// How an [`ArrayOp`]'s `triples` and `children` combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpMode {
    And,
    Or,
    Not,
}

/// One boolean-combination node of a query step: a flat list of
/// [`TripleTemplate`] filters plus nested sub-ops, combined per `mode`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayOp {
    pub mode: Option<OpMode>,
    #[serde(default)]
    pub triples: Vec<TripleTemplate>,
    #[serde(default)]
    pub children: Vec<ArrayOp>,
}

impl ArrayOp {
    pub fn new(mode: OpMode, triples: Vec<TripleTemplate>) -> Self {
        Self {
            mode: Some(mode),
            triples,
            children: Vec::new(),
        }
    }

    /// True when every template in `triples` carries a non-empty `subj`.
    pub fn all_templates_have_subj(&self) -> bool {
        !self.triples.is_empty() && self.triples.iter().all(|t| t.subj.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Which query language a [`QueryRequest`] uses. Only `Basic` is implemented;
/// the others are accepted on the wire but rejected by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Basic,
    Gremlin,
    Mql,
}

/// A (possibly sharded) query: a sequence of [`ArrayOp`] steps executed in
/// order, each step's results feeding the next step's subject set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub steps: Vec<ArrayOp>,
    pub limit: i64,
    /// Set by the dispatcher when forwarding a single step to a shard:
    /// a sharded request is executed directly against local storage.
    #[serde(default)]
    pub sharded: bool,
}
