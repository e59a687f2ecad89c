// src/core/storage/zset.rs

//! The sorted-set container: members ordered by score, then lexicographically.

use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// A single entry in a sorted set.
#[derive(Debug, Clone, PartialEq)]
pub struct ZSetEntry {
    pub score: f64,
    pub member: Bytes,
}

/// Defines a boundary for score-based range queries (`ZRANGEBYSCORE`, `ZCOUNT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
    NegInfinity,
    PosInfinity,
}

impl ScoreBound {
    /// Parses the wire form: a float, optionally prefixed with `(`, or
    /// `-inf` / `+inf`.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            b"-inf" | b"-INF" => return Some(ScoreBound::NegInfinity),
            b"+inf" | b"inf" | b"+INF" | b"INF" => return Some(ScoreBound::PosInfinity),
            _ => {}
        }
        if let Some(rest) = raw.strip_prefix(b"(") {
            let score: f64 = std::str::from_utf8(rest).ok()?.parse().ok()?;
            return Some(ScoreBound::Exclusive(score));
        }
        let score: f64 = std::str::from_utf8(raw).ok()?.parse().ok()?;
        Some(ScoreBound::Inclusive(score))
    }

    /// Where an in-order scan over the score index should start for this
    /// bound used as a minimum. Exclusive bounds still seek to the bound
    /// score; `admits_min` filters out the equal-score entries.
    fn seek_from(&self) -> Bound<(OrderedFloat<f64>, Bytes)> {
        match self {
            ScoreBound::Inclusive(s) | ScoreBound::Exclusive(s) => {
                Bound::Included((OrderedFloat(*s), Bytes::new()))
            }
            ScoreBound::NegInfinity => Bound::Unbounded,
            ScoreBound::PosInfinity => Bound::Excluded((OrderedFloat(f64::INFINITY), Bytes::new())),
        }
    }

    /// True if a score satisfies this bound used as the range minimum.
    fn admits_min(&self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(s) => score >= *s,
            ScoreBound::Exclusive(s) => score > *s,
            ScoreBound::NegInfinity => true,
            ScoreBound::PosInfinity => false,
        }
    }

    /// True if a score satisfies this bound used as the range maximum.
    fn admits_max(&self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(s) => score <= *s,
            ScoreBound::Exclusive(s) => score < *s,
            ScoreBound::PosInfinity => true,
            ScoreBound::NegInfinity => false,
        }
    }
}

/// A sorted set backed by two indexes: a by-score ordered set for range
/// queries and a by-member map for O(1) score lookups.
///
/// The two structures always agree: every mutation goes through `insert` /
/// `remove`, which update both.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    by_score: BTreeSet<(OrderedFloat<f64>, Bytes)>,
    by_member: HashMap<Bytes, f64>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Adds or updates a member. Returns true when the member is new.
    pub fn insert(&mut self, score: f64, member: Bytes) -> bool {
        match self.by_member.insert(member.clone(), score) {
            Some(old_score) => {
                self.by_score.remove(&(OrderedFloat(old_score), member.clone()));
                self.by_score.insert((OrderedFloat(score), member));
                false
            }
            None => {
                self.by_score.insert((OrderedFloat(score), member));
                true
            }
        }
    }

    /// Removes a member, returning its score if it was present.
    pub fn remove(&mut self, member: &Bytes) -> Option<f64> {
        let score = self.by_member.remove(member)?;
        self.by_score.remove(&(OrderedFloat(score), member.clone()));
        Some(score)
    }

    pub fn score(&self, member: &Bytes) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    /// The 0-based position of a member in ascending score order.
    pub fn rank(&self, member: &Bytes) -> Option<usize> {
        let score = self.by_member.get(member)?;
        let target = (OrderedFloat(*score), member.clone());
        Some(self.by_score.iter().take_while(|e| **e < target).count())
    }

    /// Entries in the rank range `[start, stop]` (inclusive, already
    /// normalised to 0-based non-negative indexes).
    pub fn range_by_rank(&self, start: usize, stop: usize) -> Vec<ZSetEntry> {
        if start > stop {
            return Vec::new();
        }
        self.by_score
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(score, member)| ZSetEntry {
                score: score.0,
                member: member.clone(),
            })
            .collect()
    }

    /// Entries whose score falls between the two bounds, ascending.
    pub fn range_by_score(&self, min: &ScoreBound, max: &ScoreBound) -> Vec<ZSetEntry> {
        self.score_range(min, max)
            .map(|(score, member)| ZSetEntry {
                score: score.0,
                member: member.clone(),
            })
            .collect()
    }

    pub fn count_in_range(&self, min: &ScoreBound, max: &ScoreBound) -> usize {
        self.score_range(min, max).count()
    }

    fn score_range<'a>(
        &'a self,
        min: &'a ScoreBound,
        max: &'a ScoreBound,
    ) -> impl Iterator<Item = &'a (OrderedFloat<f64>, Bytes)> + 'a {
        self.by_score
            .range((min.seek_from(), Bound::Unbounded))
            .take_while(|(score, _)| max.admits_max(score.0))
            .filter(|(score, _)| min.admits_min(score.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = ZSetEntry> + '_ {
        self.by_score.iter().map(|(score, member)| ZSetEntry {
            score: score.0,
            member: member.clone(),
        })
    }

    pub fn memory_usage(&self) -> usize {
        self.by_member
            .keys()
            .map(|m| 2 * m.len() + 64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(entries: &[(f64, &str)]) -> SortedSet {
        let mut zset = SortedSet::new();
        for (score, member) in entries {
            zset.insert(*score, Bytes::copy_from_slice(member.as_bytes()));
        }
        zset
    }

    #[test]
    fn insert_updates_existing_member() {
        let mut zset = set_of(&[(1.0, "a"), (2.0, "b")]);
        assert!(!zset.insert(5.0, Bytes::from_static(b"a")));
        assert_eq!(zset.len(), 2);
        assert_eq!(zset.score(&Bytes::from_static(b"a")), Some(5.0));
        assert_eq!(zset.rank(&Bytes::from_static(b"a")), Some(1));
    }

    #[test]
    fn orders_by_score_then_member() {
        let zset = set_of(&[(2.0, "b"), (1.0, "z"), (1.0, "a")]);
        let members: Vec<_> = zset.iter().map(|e| e.member).collect();
        assert_eq!(
            members,
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"z"),
                Bytes::from_static(b"b")
            ]
        );
    }

    #[test]
    fn range_by_score_respects_exclusive_bounds() {
        let zset = set_of(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        let entries =
            zset.range_by_score(&ScoreBound::Exclusive(1.0), &ScoreBound::Inclusive(3.0));
        let members: Vec<_> = entries.into_iter().map(|e| e.member).collect();
        assert_eq!(members, vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
    }

    #[test]
    fn count_with_infinities() {
        let zset = set_of(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert_eq!(
            zset.count_in_range(&ScoreBound::NegInfinity, &ScoreBound::PosInfinity),
            3
        );
    }

    #[test]
    fn score_bound_parsing() {
        assert_eq!(ScoreBound::parse(b"1.5"), Some(ScoreBound::Inclusive(1.5)));
        assert_eq!(ScoreBound::parse(b"(3"), Some(ScoreBound::Exclusive(3.0)));
        assert_eq!(ScoreBound::parse(b"-inf"), Some(ScoreBound::NegInfinity));
        assert_eq!(ScoreBound::parse(b"nonsense"), None);
    }
}
