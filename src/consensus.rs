//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! Consensus decisions.
//!
//! This module turns posterior means of the consensus variables into a
//! binary answer key and computes the naive majority-vote baseline the key
//! is compared against.  Both rules use a strict `> 0.5` threshold, so an
//! exact tie resolves to 0.

use crate::data::ResponseMatrix;
use crate::error::{CctError, Result};

/// Threshold above which an item is decided as 1.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Decides a single item from the posterior probability that its answer is 1.
///
/// # Examples
///
/// ```
/// use cultural_consensus::consensus::decide;
///
/// assert_eq!(decide(0.93), 1);
/// // Ties are not consensus.
/// assert_eq!(decide(0.5), 0);
/// ```
#[inline]
pub fn decide(mean: f64) -> u8 {
    u8::from(mean > DECISION_THRESHOLD)
}

/// Applies [`decide`] to every item.
pub fn consensus_answers(z_means: &[f64]) -> Vec<u8> {
    z_means.iter().map(|&mean| decide(mean)).collect()
}

/// Per-item majority vote computed directly from the raw responses.
///
/// An item is voted 1 when strictly more than half of the informants
/// answered 1.  The result depends only on column counts and is therefore
/// invariant under any permutation of informants.
pub fn majority_vote(matrix: &ResponseMatrix) -> Vec<u8> {
    matrix.column_means().into_iter().map(decide).collect()
}

/// Item-wise disagreement between two answer keys (`true` = different).
///
/// Fails with [`CctError::Dimension`] when the keys differ in length.
pub fn differences(model: &[u8], baseline: &[u8]) -> Result<Vec<bool>> {
    if model.len() != baseline.len() {
        return Err(CctError::Dimension {
            name: "baseline",
            expected: model.len(),
            found: baseline.len(),
        });
    }
    Ok(model.iter().zip(baseline).map(|(a, b)| a != b).collect())
}
