//! Gibbs update for the discrete block.
//!
//! Given the competences, the consensus answers are conditionally
//! independent, so every `Z[j]` is redrawn exactly from
//!
//! ```text
//! P(Z[j] = 1 | D, X) = sigmoid( Σᵢ (2·X[i,j] − 1) · logit(D[i]) )
//! ```
//!
//! The fair prior on `Z[j]` cancels from the odds.

use crate::model::{log_competence_pair, CctModel};
use rand::Rng;

/// Discrete block of the compound step.
#[derive(Debug, Clone, Default)]
pub struct GibbsBlock {
    logit_d: Vec<f64>,
}

impl GibbsBlock {
    /// Redraws every consensus answer from its full conditional given the
    /// competences in unconstrained form.  Returns how many answers changed.
    pub fn step<R: Rng>(
        &mut self,
        model: &CctModel<'_>,
        theta: &[f64],
        z: &mut [u8],
        rng: &mut R,
    ) -> usize {
        self.logit_d.clear();
        self.logit_d.extend(theta.iter().map(|&t| {
            let (ln_d, ln_not_d) = log_competence_pair(t);
            ln_d - ln_not_d
        }));
        let mut flips = 0;
        for (j, zj) in z.iter_mut().enumerate() {
            let log_odds = model.consensus_log_odds(j, &self.logit_d);
            let p_one = conditional_probability(log_odds);
            let next = u8::from(rng.gen::<f64>() < p_one);
            flips += usize::from(next != *zj);
            *zj = next;
        }
        flips
    }
}

/// `P(Z = 1)` from its log odds.
#[inline]
pub fn conditional_probability(log_odds: f64) -> f64 {
    if log_odds >= 0.0 {
        1.0 / (1.0 + (-log_odds).exp())
    } else {
        let e = log_odds.exp();
        e / (1.0 + e)
    }
}
