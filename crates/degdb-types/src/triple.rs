//! The triple: degdb's single unit of data.

use serde::{Deserialize, Serialize};

/// A signed RDF-style statement: `(subj, pred, obj)` plus metadata.
///
/// `(subj, pred, obj)` is the unique key in local storage — two triples
/// with the same three fields are the same triple regardless of author,
/// signature or creation time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subj: String,
    pub pred: String,
    pub obj: String,
    /// Optional BCP-47 language tag for `obj`, when `obj` is a literal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Identifier of the signer, derived from their public key.
    #[serde(default)]
    pub author: String,
    /// `r || s` of the ECDSA signature over the triple's fingerprint.
    #[serde(default)]
    pub sig: Vec<u8>,
    /// Unix timestamp (seconds) the triple was created.
    #[serde(default)]
    pub created: i64,
}

impl Triple {
    /// A shallow copy, mirroring the reference implementation's
    /// `CloneTriples` (there called shallow because Go passes pointers;
    /// here it's a genuine owned clone).
    pub fn clone_triple(&self) -> Self {
        self.clone()
    }
}

/// Sorts triples by `(subj, pred, obj)`, matching `protocol.SortTriples`.
pub fn sort_triples(triples: &mut [Triple]) {
    triples.sort_by(|a, b| (&a.subj, &a.pred, &a.obj).cmp(&(&b.subj, &b.pred, &b.obj)));
}

/// Clones a slice of triples, matching `protocol.CloneTriples`.
pub fn clone_triples(triples: &[Triple]) -> Vec<Triple> {
    triples.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_by_subj_pred_obj() {
        let mut triples = vec![
            Triple {
                subj: "b".into(),
                pred: "p".into(),
                obj: "o".into(),
                ..Default::default()
            },
            Triple {
                subj: "a".into(),
                pred: "p".into(),
                obj: "o".into(),
                ..Default::default()
            },
        ];
        sort_triples(&mut triples);
        assert_eq!(triples[0].subj, "a");
        assert_eq!(triples[1].subj, "b");
    }

    #[test]
    fn identity_ignores_metadata() {
        let a = Triple {
            subj: "s".into(),
            pred: "p".into(),
            obj: "o".into(),
            author: "x".into(),
            ..Default::default()
        };
        let mut b = a.clone_triple();
        b.author = "y".into();
        assert_eq!((a.subj, a.pred, a.obj), (b.subj, b.pred, b.obj));
    }
}
