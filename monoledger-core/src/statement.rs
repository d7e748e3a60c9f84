//! Differential statement polling.
//!
//! The first snapshot only primes the baseline, so history already on the
//! statement is never replayed as new. Every later snapshot is diffed against
//! the previous one by transaction id and then becomes the new baseline.

use std::collections::HashSet;

use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No baseline yet.
    Priming,
    Diffing,
}

#[derive(Debug, Clone, Default)]
pub struct StatementTracker {
    baseline: Option<Vec<Transaction>>,
}

impl StatementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PollPhase {
        match self.baseline {
            None => PollPhase::Priming,
            Some(_) => PollPhase::Diffing,
        }
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Feed a freshly fetched snapshot; returns the transactions not present
    /// in the previous one, in snapshot order.
    pub fn observe(&mut self, snapshot: Vec<Transaction>) -> Vec<Transaction> {
        let fresh = match &self.baseline {
            None => Vec::new(),
            Some(previous) => new_transactions(previous, &snapshot),
        };
        self.baseline = Some(snapshot);
        fresh
    }
}

/// `current` minus every transaction whose id appears in `previous`, order preserved.
pub fn new_transactions(previous: &[Transaction], current: &[Transaction]) -> Vec<Transaction> {
    let seen: HashSet<&str> = previous.iter().map(|t| t.id.as_str()).collect();
    current
        .iter()
        .filter(|t| !seen.contains(t.id.as_str()))
        .cloned()
        .collect()
}
