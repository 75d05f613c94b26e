//! Greedy covering-set selection.
//!
//! Given a target arc and a pool of candidate arcs (typically peers' own
//! arcs), picks a small subset whose union covers the target, preferring
//! at each step the candidate that grows the running union the least
//! beyond what's still missing. This keeps covering sets small and their
//! arcs minimally overlapping, which is what makes query fan-out cheap.

use crate::arc::{self, Keyspace};

/// Greedily select arcs from `candidates` until their union covers `target`
/// (or candidates run out). Returns the indices into `candidates`, in the
/// order they were picked.
///
/// At each step the candidate chosen is the one whose
/// [`arc::keyspace_increase`] against the *unmet portion of the target* is
/// largest — i.e. the candidate contributing the most new, still-needed
/// coverage. Ties are broken by the order candidates were given.
pub fn select_covering_set(target: Keyspace, candidates: &[Keyspace]) -> Vec<usize> {
    let mut picked = Vec::new();
    let mut covered: Option<Keyspace> = None;
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    loop {
        let missing = match arc::intersection(arc::complement(covered), Some(target)) {
            Some(m) if !m.is_empty() => m,
            _ => break,
        };

        let mut best: Option<(usize, u64)> = None;
        for &idx in &remaining {
            let candidate = candidates[idx];
            let overlap = match arc::intersection(Some(candidate), Some(missing)) {
                Some(o) => o.mag(),
                None => 0,
            };
            if overlap == 0 {
                continue;
            }
            if best.map(|(_, score)| overlap > score).unwrap_or(true) {
                best = Some((idx, overlap));
            }
        }

        let Some((idx, _)) = best else {
            break;
        };

        picked.push(idx);
        remaining.retain(|&i| i != idx);
        covered = arc::union(covered, Some(candidates[idx]));
    }

    picked
}
