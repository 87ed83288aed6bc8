//! Sparse per-round points.
//!
//! The set of rounds differs from year to year (some championships skip
//! numbers between their qualifying and final stages), so rounds are keyed
//! by number instead of stored in a fixed-width array. A registered round
//! with no score is present with `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundPoints(BTreeMap<u32, Option<f64>>);

impl RoundPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a round's value, replacing any previous one.
    pub fn insert(&mut self, round: u32, points: Option<f64>) {
        self.0.insert(round, points);
    }

    /// Builder form of [`RoundPoints::insert`].
    pub fn with(mut self, round: u32, points: Option<f64>) -> Self {
        self.insert(round, points);
        self
    }

    /// Points for a round, `None` when the round is unregistered or unscored.
    pub fn get(&self, round: u32) -> Option<f64> {
        self.0.get(&round).copied().flatten()
    }

    pub fn contains_round(&self, round: u32) -> bool {
        self.0.contains_key(&round)
    }

    /// All registered round numbers, ascending.
    pub fn rounds(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    /// Rounds that carry a score, ascending.
    pub fn recorded(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().filter_map(|(r, p)| p.map(|p| (*r, p)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<f64>)> + '_ {
        self.0.iter().map(|(r, p)| (*r, *p))
    }

    pub fn has_any(&self) -> bool {
        self.0.values().any(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of recorded rounds, `None` if nothing was recorded.
    pub fn sum(&self) -> Option<f64> {
        if !self.has_any() {
            return None;
        }
        Some(self.recorded().map(|(_, p)| p).sum())
    }

    /// Sum of the best `k` scores among the first `n` registered rounds.
    ///
    /// Unscored rounds inside the first `n` count as absent, not zero.
    pub fn top_k_sum(&self, n: usize, k: usize) -> f64 {
        let mut window: Vec<f64> = self.0.values().take(n).filter_map(|p| *p).collect();
        window.sort_by(|a, b| b.total_cmp(a));
        window.into_iter().take(k).sum()
    }
}

impl FromIterator<(u32, Option<f64>)> for RoundPoints {
    fn from_iter<I: IntoIterator<Item = (u32, Option<f64>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
