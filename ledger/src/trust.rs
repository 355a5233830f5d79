//! Per-session trust scores.
//!
//! Every session starts at the ledger's initial score (100.0 by default) and
//! loses `probability * 100` points per assessed item, never dropping below
//! zero. Updates for one session are serialized by the ledger lock, so two
//! concurrent deductions can never overwrite each other.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use entityx_types::SessionId;

pub const DEFAULT_INITIAL_SCORE: f64 = 100.0;

const MAX_SCORE: f64 = 100.0;

/// Result of one ledger update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustUpdate {
    /// Score after the deduction, rounded to 2 decimal places.
    pub score: f64,
    /// Points deducted, rounded to 2 decimal places. Never negative.
    pub deduction: f64,
}

impl TrustUpdate {
    /// Signed change to the score as reported to clients.
    #[must_use]
    pub fn delta(&self) -> f64 {
        -self.deduction
    }
}

#[derive(Debug)]
pub struct TrustLedger {
    initial_score: f64,
    scores: Mutex<HashMap<SessionId, f64>>,
}

impl TrustLedger {
    /// `initial_score` is clamped to `[0, 100]`; NaN falls back to the default.
    #[must_use]
    pub fn new(initial_score: f64) -> Self {
        let initial_score = if initial_score.is_nan() {
            DEFAULT_INITIAL_SCORE
        } else {
            initial_score.clamp(0.0, MAX_SCORE)
        };
        Self {
            initial_score,
            scores: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn initial_score(&self) -> f64 {
        self.initial_score
    }

    /// Deduct `probability` (clamped to `[0, 1]`) from the session's score.
    ///
    /// The read-modify-write happens under the ledger lock.
    pub fn update(&self, session: &SessionId, probability: f64) -> TrustUpdate {
        let deduction = round_to(clamp_probability(probability) * 100.0, 2);

        let mut scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        let current = scores
            .get(session)
            .copied()
            .unwrap_or(self.initial_score);
        let score = round_to((current - deduction).max(0.0), 2);
        scores.insert(session.clone(), score);
        drop(scores);

        tracing::debug!(session = %session, deduction, score, "trust score updated");
        TrustUpdate { score, deduction }
    }

    /// Current score; unseen sessions report the initial score.
    #[must_use]
    pub fn get(&self, session: &SessionId) -> f64 {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .copied()
            .unwrap_or(self.initial_score)
    }

    /// Forget the session, restoring it to the initial score.
    pub fn reset(&self, session: &SessionId) {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session);
    }

    /// Number of sessions with a recorded score.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SCORE)
    }
}

/// Round to `decimals` places, ties to even.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

// NaN counts as certain.
fn clamp_probability(probability: f64) -> f64 {
    if probability.is_nan() {
        1.0
    } else {
        probability.clamp(0.0, 1.0)
    }
}
