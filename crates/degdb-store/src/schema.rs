//! SQL schema for local triple storage.

/// Complete schema for degdb's v1 database: a single `triples` table with
/// indices on `subj` and `pred` and a uniqueness constraint on
/// `(subj, pred, obj)` — the triple's identity per spec §3.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS triples (
    subj    TEXT NOT NULL,
    pred    TEXT NOT NULL,
    obj     TEXT NOT NULL,
    lang    TEXT,
    author  TEXT NOT NULL,
    sig     BLOB NOT NULL,
    created INTEGER NOT NULL,
    UNIQUE(subj, pred, obj)
);

CREATE INDEX IF NOT EXISTS idx_triples_subj ON triples(subj);
CREATE INDEX IF NOT EXISTS idx_triples_pred ON triples(pred);
"#;
