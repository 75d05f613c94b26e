//! Triple storage: insert, template query, `ArrayOp` query compilation,
//! full-table streaming, and bloom-filter generation.

use std::collections::HashMap;
use std::sync::Mutex;

use degdb_crypto::hashing::hash_str;
use degdb_keyspace::Keyspace;
use degdb_types::{ArrayOp, OpMode, Triple, TripleTemplate};
use growable_bloom_filter::GrowableBloom;
use rusqlite::{params, Connection};

use crate::Result;

/// `Insert`/`Query`/`QueryExpression`/`StreamAll` and bloom-filter
/// generation against the local triple set (spec §1 "OUT OF SCOPE" local
/// store interface).
pub trait TripleStore: Send + Sync {
    fn insert(&self, triples: &[Triple]) -> Result<()>;
    fn query(&self, template: &TripleTemplate, limit: i64) -> Result<Vec<Triple>>;
    fn query_expression(&self, op: &ArrayOp, limit: i64) -> Result<Vec<Triple>>;
    fn stream_all(&self, batch_size: usize) -> Result<Vec<Vec<Triple>>>;
    fn bloom_filter(&self, arc: Option<Keyspace>) -> Result<GrowableBloom>;
}

/// The reference `TripleStore`, backed by a single SQLite connection
/// behind a mutex (rusqlite's `Connection` has no internal locking).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn row_to_triple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Triple> {
    Ok(Triple {
        subj: row.get(0)?,
        pred: row.get(1)?,
        obj: row.get(2)?,
        lang: row.get(3)?,
        author: row.get(4)?,
        sig: row.get(5)?,
        created: row.get(6)?,
    })
}

const SELECT_COLUMNS: &str = "subj, pred, obj, lang, author, sig, created";

fn query_template(conn: &Connection, template: &TripleTemplate, limit: i64) -> Result<Vec<Triple>> {
    let mut clauses = Vec::new();
    let mut values: Vec<&dyn rusqlite::ToSql> = Vec::new();

    if let Some(subj) = &template.subj {
        clauses.push("subj = ?");
        values.push(subj);
    }
    if let Some(pred) = &template.pred {
        clauses.push("pred = ?");
        values.push(pred);
    }
    if let Some(obj) = &template.obj {
        clauses.push("obj = ?");
        values.push(obj);
    }
    if let Some(lang) = &template.lang {
        clauses.push("lang = ?");
        values.push(lang);
    }
    if let Some(author) = &template.author {
        clauses.push("author = ?");
        values.push(author);
    }

    let where_clause = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };

    let sql = format!("SELECT {SELECT_COLUMNS} FROM triples WHERE {where_clause} LIMIT ?");
    values.push(&limit);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(values.as_slice(), row_to_triple)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn key(t: &Triple) -> (String, String, String) {
    (t.subj.clone(), t.pred.clone(), t.obj.clone())
}

/// Evaluate one `ArrayOp` node: each listed template and each child op is
/// an operand set, combined per `mode` (defaulting to AND when unset).
fn eval_array_op(conn: &Connection, op: &ArrayOp, limit: i64) -> Result<Vec<Triple>> {
    let mut operands: Vec<Vec<Triple>> = Vec::with_capacity(op.triples.len() + op.children.len());
    for template in &op.triples {
        operands.push(query_template(conn, template, limit)?);
    }
    for child in &op.children {
        operands.push(eval_array_op(conn, child, limit)?);
    }

    if operands.is_empty() {
        return Ok(Vec::new());
    }

    match op.mode.unwrap_or(OpMode::And) {
        OpMode::Or => {
            let mut seen = HashMap::new();
            for triple in operands.into_iter().flatten() {
                seen.entry(key(&triple)).or_insert(triple);
            }
            Ok(seen.into_values().collect())
        }
        OpMode::And => {
            let mut iter = operands.into_iter();
            let first = iter.next().unwrap_or_default();
            let mut acc: HashMap<_, _> = first.into_iter().map(|t| (key(&t), t)).collect();
            for operand in iter {
                let keys: std::collections::HashSet<_> = operand.iter().map(key).collect();
                acc.retain(|k, _| keys.contains(k));
            }
            Ok(acc.into_values().collect())
        }
        OpMode::Not => {
            let excluded: std::collections::HashSet<_> =
                operands.into_iter().flatten().map(|t| key(&t)).collect();
            let all = query_template(conn, &TripleTemplate::default(), i64::MAX)?;
            Ok(all
                .into_iter()
                .filter(|t| !excluded.contains(&key(t)))
                .collect())
        }
    }
}

impl TripleStore for SqliteStore {
    fn insert(&self, triples: &[Triple]) -> Result<()> {
        let conn = self.lock();
        for t in triples {
            conn.execute(
                "INSERT OR IGNORE INTO triples (subj, pred, obj, lang, author, sig, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![t.subj, t.pred, t.obj, t.lang, t.author, t.sig, t.created],
            )?;
        }
        Ok(())
    }

    fn query(&self, template: &TripleTemplate, limit: i64) -> Result<Vec<Triple>> {
        query_template(&self.lock(), template, limit)
    }

    fn query_expression(&self, op: &ArrayOp, limit: i64) -> Result<Vec<Triple>> {
        eval_array_op(&self.lock(), op, limit)
    }

    fn stream_all(&self, batch_size: usize) -> Result<Vec<Vec<Triple>>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM triples"))?;
        let all = stmt
            .query_map([], row_to_triple)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(all.chunks(batch_size.max(1)).map(|c| c.to_vec()).collect())
    }

    fn bloom_filter(&self, arc: Option<Keyspace>) -> Result<GrowableBloom> {
        const FALSE_POSITIVE_RATE: f64 = 1e-9;
        const EXPECTED_ITEMS: usize = 100_000;
        let mut filter = GrowableBloom::new(FALSE_POSITIVE_RATE, EXPECTED_ITEMS);
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM triples"))?;
        let rows = stmt.query_map([], row_to_triple)?;
        for row in rows {
            let triple = row?;
            if let Some(arc) = arc {
                if !arc.includes(hash_str(&triple.subj)) {
                    continue;
                }
            }
            filter.insert(degdb_crypto::fingerprint::canonical_bytes(&triple));
        }
        Ok(filter)
    }
}

#[cfg(test)]
fn count_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM triples", [], |r| r.get(0))
        .unwrap_or(0)
}
