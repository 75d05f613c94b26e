//! Wraparound arc arithmetic on the 64-bit hash ring.
//!
//! A [`Keyspace`] is a half-open interval `[start, end)` on the unsigned
//! 64-bit ring. `end == start.wrapping_sub(1)` denotes the full ring; an
//! interval with `start == end` denotes the empty set. "No keyspace at all"
//! (the neutral element for [`union`]) is modeled as `Option<Keyspace>`,
//! matching the nil-receiver handling of the original implementation.

use serde::{Deserialize, Serialize};

/// A half-open arc `[start, end)` on the unsigned 64-bit ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyspace {
    pub start: u64,
    pub end: u64,
}

impl Keyspace {
    /// Construct an arc directly.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The arc centered on `hash` with the given `radius` on either side.
    ///
    /// Used to derive a peer's arc from `murmur3_64(peer.id)`.
    pub fn centered(hash: u64, radius: u64) -> Self {
        Self {
            start: hash.wrapping_sub(radius),
            end: hash.wrapping_add(radius),
        }
    }

    /// Whether `hash` falls inside this arc, respecting wraparound.
    pub fn includes(&self, hash: u64) -> bool {
        let (s, e) = (self.start, self.end);
        (s <= hash && hash < e) || (hash < e && e < s) || (e < s && s <= hash)
    }

    /// `end - start` in wrapping unsigned arithmetic.
    pub fn mag(&self) -> u64 {
        self.end.wrapping_sub(self.start)
    }

    /// Whether this arc covers the entire ring.
    pub fn maxed(&self) -> bool {
        self.end == self.start.wrapping_sub(1)
    }

    /// Whether this arc is the empty set (`start == end`).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The union of two (possibly absent) arcs.
///
/// `None` is the neutral element: `union(None, k) == Some(k)` and
/// `union(None, None) == None`. When both arcs overlap only partially the
/// result is the smallest arc containing both; when they are disjoint the
/// result is `None` (callers treat that as "no overlap").
pub fn union(a: Option<Keyspace>, b: Option<Keyspace>) -> Option<Keyspace> {
    match (a, b) {
        (None, None) => None,
        (None, Some(k)) => Some(k),
        (Some(k), None) => Some(k),
        (Some(k), Some(a)) => {
            let a_si = k.includes(a.start) || k.end == a.start;
            let a_ei = k.includes(a.end) || k.start == a.end;
            let k_si = a.includes(k.start) || a.end == k.start;
            let k_ei = a.includes(k.end) || a.start == k.end;

            match (a_si, a_ei, k_si, k_ei) {
                // both arcs' endpoints lie inside the other: together they cover the ring
                (true, true, true, true) => Some(Keyspace {
                    start: k.start,
                    end: k.start.wrapping_sub(1),
                }),
                // a is contained in k
                (true, true, ..) => Some(k),
                // k is contained in a
                (.., true, true) => Some(a),
                // a.start lies in k, a.end does not
                (true, false, ..) => Some(Keyspace {
                    start: k.start,
                    end: a.end,
                }),
                // a.end lies in k, a.start does not
                (false, true, ..) => Some(Keyspace {
                    start: a.start,
                    end: k.end,
                }),
                // disjoint
                _ => None,
            }
        }
    }
}

/// The intersection of two (possibly absent) arcs.
///
/// `None` propagates: any intersection involving an absent arc is `None`.
/// When there are multiple disjoint overlapping segments this returns the
/// first one found by the case analysis, matching the reference
/// implementation's documented "sane default" behavior.
pub fn intersection(a: Option<Keyspace>, b: Option<Keyspace>) -> Option<Keyspace> {
    let (k, a) = match (a, b) {
        (Some(k), Some(a)) => (k, a),
        _ => return None,
    };

    if k.maxed() && a.maxed() {
        return Some(k);
    }

    let a_si = k.includes(a.start) || k.end == a.start;
    let a_ei = k.includes(a.end) || k.start == a.end;
    let k_si = a.includes(k.start) || a.end == k.start;
    let k_ei = a.includes(k.end) || a.start == k.end;

    match (a_si, a_ei, k_si, k_ei) {
        (true, true, true, true) => Some(Keyspace {
            start: k.start,
            end: a.end,
        }),
        (true, true, ..) => Some(a),
        (.., true, true) => Some(k),
        (true, false, ..) => Some(Keyspace {
            start: a.start,
            end: k.end,
        }),
        (false, true, ..) => Some(Keyspace {
            start: k.start,
            end: a.end,
        }),
        _ => None,
    }
}

/// The complement of a (possibly absent) arc: `[end, start)`.
///
/// The complement of the full ring is the empty arc (`None`); the
/// complement of the empty arc is the full ring, anchored arbitrarily at 0
/// since a maxed arc's position on the ring is not otherwise meaningful.
pub fn complement(a: Option<Keyspace>) -> Option<Keyspace> {
    match a {
        None => Some(Keyspace {
            start: 0,
            end: 0u64.wrapping_sub(1),
        }),
        Some(k) if k.maxed() => None,
        Some(k) => Some(Keyspace {
            start: k.end,
            end: k.start,
        }),
    }
}

/// The greedy covering-set heuristic's per-candidate score: how much a
/// candidate arc would grow the running union, clamped at zero.
///
/// `keyspace_increase(union, candidate) = max(0, mag(union ∪ candidate) - mag(union))`
pub fn keyspace_increase(running_union: Option<Keyspace>, candidate: Keyspace) -> u64 {
    let before = running_union.map(|k| k.mag()).unwrap_or(0);
    let after = union(running_union, Some(candidate))
        .map(|k| k.mag())
        .unwrap_or(0);
    after.saturating_sub(before)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ks(start: u64, end: u64) -> Option<Keyspace> {
        Some(Keyspace { start, end })
    }

    #[test]
    fn includes_basic() {
        let k = Keyspace { start: 1, end: 100 };
        assert!(k.includes(50));
        assert!(!k.includes(150));

        let wrap = Keyspace { start: 100, end: 1 };
        assert!(wrap.includes(150));
        assert!(!wrap.includes(50));

        let wrap2 = Keyspace { start: 100, end: 50 };
        assert!(wrap2.includes(25));
        assert!(!wrap2.includes(75));
    }

    #[test]
    fn union_disjoint_is_none() {
        assert_eq!(union(ks(1, 10), ks(20, 30)), None);
    }

    #[test]
    fn union_adjacent_joins() {
        assert_eq!(union(ks(1, 10), ks(10, 20)), ks(1, 20));
        assert_eq!(union(ks(10, 20), ks(1, 10)), ks(1, 20));
    }

    #[test]
    fn union_contained() {
        assert_eq!(union(ks(1, 20), ks(5, 10)), ks(1, 20));
        assert_eq!(union(ks(5, 10), ks(1, 20)), ks(1, 20));
    }

    #[test]
    fn union_wraps_at_max() {
        let a = Some(Keyspace {
            start: u64::MAX - 5,
            end: u64::MAX - 1,
        });
        let b = Some(Keyspace {
            start: u64::MAX - 1,
            end: 20,
        });
        let want = Some(Keyspace {
            start: u64::MAX - 5,
            end: 20,
        });
        assert_eq!(union(a, b), want);
        assert_eq!(union(b, a), want);
    }

    #[test]
    fn union_covers_whole_ring() {
        assert_eq!(union(ks(1, 20), ks(20, 1)), ks(1, 0));
    }

    #[test]
    fn union_with_none() {
        assert_eq!(union(None, None), None);
        assert_eq!(union(ks(1, 2), None), ks(1, 2));
        assert_eq!(union(None, ks(1, 2)), ks(1, 2));
    }

    #[test]
    fn intersection_point_of_tangency() {
        assert_eq!(intersection(ks(1, 10), ks(10, 20)), ks(10, 10));
    }

    #[test]
    fn intersection_disjoint_is_none() {
        assert_eq!(intersection(ks(1, 10), ks(20, 30)), None);
    }

    #[test]
    fn intersection_maxed_both() {
        let full = Some(Keyspace {
            start: 5,
            end: 5u64.wrapping_sub(1),
        });
        assert_eq!(intersection(full, full), full);
    }

    #[test]
    fn intersection_implies_both_maxed_or_not() {
        // property: a.Intersection(b).Maxed() => a.Maxed() && b.Maxed()
        let a = Keyspace { start: 1, end: 20 };
        let b = Keyspace { start: 20, end: 1 };
        let result = intersection(Some(a), Some(b));
        if let Some(r) = result {
            if r.maxed() {
                assert!(a.maxed() && b.maxed());
            }
        }
    }

    #[test]
    fn mag_wraps() {
        assert_eq!(Keyspace { start: 1, end: 10 }.mag(), 9);
        assert_eq!(
            Keyspace {
                start: u64::MAX - 5,
                end: 1
            }
            .mag(),
            7
        );
    }

    #[test]
    fn maxed_detection() {
        assert!(!Keyspace { start: 1, end: 10 }.maxed());
        assert!(Keyspace { start: 2, end: 1 }.maxed());
        let full = union(ks(1, 20), ks(20, 1)).expect("covers ring");
        assert!(full.maxed());
    }

    #[test]
    fn complement_roundtrip() {
        let a = Some(Keyspace { start: 1, end: 10 });
        assert_eq!(complement(a), Some(Keyspace { start: 10, end: 1 }));
        assert_eq!(complement(complement(a)), a);
    }

    #[test]
    fn complement_full_and_empty() {
        let full = union(ks(1, 20), ks(20, 1)).expect("covers ring");
        assert_eq!(complement(Some(full)), None);
        let back = complement(None).expect("complement of empty is full");
        assert!(back.maxed());
    }

    #[test]
    fn centered_arc_has_requested_radius() {
        let hash = 1_000_000u64;
        let radius = 1u64 << 62;
        let k = Keyspace::centered(hash, radius);
        assert_eq!(k.mag(), radius.wrapping_mul(2));
        assert!(k.includes(hash));
    }
}
