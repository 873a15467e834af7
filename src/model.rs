//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! Cultural Consensus Theory model.
//!
//! Informant `i` has competence `D[i] ∈ [0.5, 1]` with a uniform prior and
//! item `j` has a consensus answer `Z[j] ∈ {0, 1}` with a fair Bernoulli
//! prior.  An informant reports 1 on an item with probability
//!
//! ```text
//! p[i,j] = Z[j]·D[i] + (1 − Z[j])·(1 − D[i])
//! ```
//!
//! and the observed responses are independent Bernoulli draws given
//! `(D, Z)`.  Given `Z`, the likelihood of `D[i]` depends only on how many
//! items informant `i` answered in agreement with the key, which keeps the
//! continuous update linear in the number of informants.
//!
//! The sampler works on an unconstrained coordinate `θ` per informant with
//! `D = 0.5 + 0.5·sigmoid(θ)`; densities in `θ` include the log-Jacobian of
//! that map.

use crate::data::ResponseMatrix;
use crate::error::{CctError, Result};
use std::f64::consts::LN_2;

/// Lower bound of the competence prior.
pub const COMPETENCE_LOWER: f64 = 0.5;
/// Upper bound of the competence prior.
pub const COMPETENCE_UPPER: f64 = 1.0;
/// Prior probability that a consensus answer is 1.
pub const CONSENSUS_PRIOR: f64 = 0.5;

/// Probability that an informant with competence `d` answers 1 on an item
/// whose consensus answer is `z`.
#[inline]
pub fn response_probability(d: f64, z: u8) -> f64 {
    let z = f64::from(z);
    z * d + (1.0 - z) * (1.0 - d)
}

/// `ln(sigmoid(x))` without overflow for large `|x|`.
#[inline]
pub fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Maps an unconstrained coordinate to a competence in `(0.5, 1)`.
#[inline]
pub fn competence(theta: f64) -> f64 {
    COMPETENCE_LOWER + (COMPETENCE_UPPER - COMPETENCE_LOWER) * sigmoid(theta)
}

/// Inverse of [`competence`].  Values on or outside the bounds are pulled
/// just inside them.
pub fn unconstrained(d: f64) -> f64 {
    let s = ((d - COMPETENCE_LOWER) / (COMPETENCE_UPPER - COMPETENCE_LOWER))
        .clamp(1e-12, 1.0 - 1e-12);
    (s / (1.0 - s)).ln()
}

/// `(ln D, ln(1 − D))` for `D = competence(theta)`, accurate near both bounds.
#[inline]
pub fn log_competence_pair(theta: f64) -> (f64, f64) {
    // D = (1 + s)/2 and 1 - D = (1 - s)/2 with s = sigmoid(theta).
    let ln_d = -LN_2 + sigmoid(theta).ln_1p();
    let ln_not_d = -LN_2 + log_sigmoid(-theta);
    (ln_d, ln_not_d)
}

/// Joint CCT model bound to an observed response matrix.
#[derive(Debug, Clone, Copy)]
pub struct CctModel<'a> {
    data: &'a ResponseMatrix,
}

impl<'a> CctModel<'a> {
    /// Builds the model, rejecting matrices without informants or items.
    pub fn new(data: &'a ResponseMatrix) -> Result<Self> {
        if data.is_empty() {
            return Err(CctError::EmptyModel {
                informants: data.informants(),
                items: data.items(),
            });
        }
        Ok(Self { data })
    }

    /// Observed responses.
    pub fn data(&self) -> &'a ResponseMatrix {
        self.data
    }

    /// Number of informants, `N`.
    pub fn informants(&self) -> usize {
        self.data.informants()
    }

    /// Number of items, `M`.
    pub fn items(&self) -> usize {
        self.data.items()
    }

    fn check_dims(&self, d: &[f64], z: &[u8]) -> Result<()> {
        if d.len() != self.informants() {
            return Err(CctError::Dimension {
                name: "D",
                expected: self.informants(),
                found: d.len(),
            });
        }
        if z.len() != self.items() {
            return Err(CctError::Dimension {
                name: "Z",
                expected: self.items(),
                found: z.len(),
            });
        }
        Ok(())
    }

    /// Full `N × M` grid of response probabilities, row-major.
    pub fn response_probabilities(&self, d: &[f64], z: &[u8]) -> Result<Vec<f64>> {
        self.check_dims(d, z)?;
        let mut out = Vec::with_capacity(d.len() * z.len());
        for &di in d {
            out.extend(z.iter().map(|&zj| response_probability(di, zj)));
        }
        Ok(out)
    }

    /// Log prior density of `(D, Z)`; `-inf` outside the support.
    pub fn log_prior(&self, d: &[f64], z: &[u8]) -> Result<f64> {
        self.check_dims(d, z)?;
        if d
            .iter()
            .any(|&di| !(COMPETENCE_LOWER..=COMPETENCE_UPPER).contains(&di))
            || z.iter().any(|&zj| zj > 1)
        {
            return Ok(f64::NEG_INFINITY);
        }
        let density = 1.0 / (COMPETENCE_UPPER - COMPETENCE_LOWER);
        Ok(d.len() as f64 * density.ln() + z.len() as f64 * CONSENSUS_PRIOR.ln())
    }

    /// Log likelihood of the observed responses given `(D, Z)`.
    pub fn log_likelihood(&self, d: &[f64], z: &[u8]) -> Result<f64> {
        self.check_dims(d, z)?;
        let agree = self.agreements(z);
        let m = self.items() as f64;
        Ok(d.iter()
            .zip(agree)
            .map(|(&di, k)| {
                let k = k as f64;
                xlogy(k, di) + xlogy(m - k, 1.0 - di)
            })
            .sum())
    }

    /// Unnormalised log joint density `log p(D, Z, X)`.
    pub fn log_joint(&self, d: &[f64], z: &[u8]) -> Result<f64> {
        let prior = self.log_prior(d, z)?;
        if prior == f64::NEG_INFINITY {
            return Ok(prior);
        }
        Ok(prior + self.log_likelihood(d, z)?)
    }

    /// Number of items on which each informant agrees with the key `z`.
    pub fn agreements(&self, z: &[u8]) -> Vec<usize> {
        let mut out = vec![0; self.informants()];
        self.agreements_into(z, &mut out);
        out
    }

    /// Allocation-free form of [`agreements`](Self::agreements).
    pub fn agreements_into(&self, z: &[u8], out: &mut [usize]) {
        for (slot, row) in out.iter_mut().zip(self.data.rows()) {
            *slot = row.iter().zip(z).filter(|(x, zj)| x == zj).count();
        }
    }

    /// Log density of the competences in unconstrained coordinates, given
    /// the agreement counts of the current key.  Writes the gradient with
    /// respect to `theta` into `grad`.
    pub fn competence_log_density(
        &self,
        theta: &[f64],
        agreements: &[usize],
        grad: &mut [f64],
    ) -> f64 {
        let m = self.items() as f64;
        let mut total = 0.0;
        for ((&t, &k), g) in theta.iter().zip(agreements).zip(grad.iter_mut()) {
            let k = k as f64;
            let s = sigmoid(t);
            let (ln_d, ln_not_d) = log_competence_pair(t);
            let log_jacobian = -LN_2 + log_sigmoid(t) + log_sigmoid(-t);
            total += k * ln_d + (m - k) * ln_not_d + log_jacobian;
            *g = k * s * (1.0 - s) / (1.0 + s) - (m - k) * s + 1.0 - 2.0 * s;
        }
        total
    }

    /// `log P(Z[j]=1 | D, X) − log P(Z[j]=0 | D, X)` where `logit_d[i]` is
    /// `ln D[i] − ln(1 − D[i])`.
    pub fn consensus_log_odds(&self, j: usize, logit_d: &[f64]) -> f64 {
        (0..self.informants())
            .map(|i| {
                if self.data.get(i, j) == 1 {
                    logit_d[i]
                } else {
                    -logit_d[i]
                }
            })
            .sum()
    }
}

/// `x·ln(y)` with the convention `0·ln(0) = 0`.
#[inline]
fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small() -> ResponseMatrix {
        ResponseMatrix::from_rows(&[vec![1, 0, 1, 1], vec![1, 1, 1, 0], vec![0, 0, 1, 1]]).unwrap()
    }

    #[test]
    fn test_rejects_empty_matrix() {
        let empty = ResponseMatrix::from_rows(&[]).unwrap();
        assert!(matches!(
            CctModel::new(&empty),
            Err(CctError::EmptyModel { .. })
        ));
        let no_items = ResponseMatrix::from_rows(&[vec![], vec![]]).unwrap();
        assert!(matches!(
            CctModel::new(&no_items),
            Err(CctError::EmptyModel {
                informants: 2,
                items: 0
            })
        ));
    }

    #[test]
    fn test_response_grid_shape() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let grid = model
            .response_probabilities(&[0.9, 0.6, 0.75], &[1, 0, 1, 0])
            .unwrap();
        assert_eq!(grid.len(), 12);
        assert!((grid[0] - 0.9).abs() < 1e-12);
        assert!((grid[1] - 0.1).abs() < 1e-12);
        assert!((grid[5] - 0.4).abs() < 1e-12);
        assert!(matches!(
            model.response_probabilities(&[0.9], &[1, 0, 1, 0]),
            Err(CctError::Dimension { name: "D", .. })
        ));
    }

    #[test]
    fn test_log_joint_outside_support() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let lp = model.log_joint(&[0.4, 0.8, 0.8], &[1, 0, 1, 1]).unwrap();
        assert_eq!(lp, f64::NEG_INFINITY);
        let lp = model.log_joint(&[0.7, 0.8, 0.8], &[1, 0, 2, 1]).unwrap();
        assert_eq!(lp, f64::NEG_INFINITY);
        assert!(model.log_joint(&[0.7, 0.8, 0.8], &[1, 0, 1, 1]).unwrap().is_finite());
    }

    #[test]
    fn test_likelihood_matches_cellwise_bernoulli() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let d = [0.9, 0.55, 0.7];
        let z = [1, 0, 1, 1];
        let grid = model.response_probabilities(&d, &z).unwrap();
        let mut expected = 0.0;
        for i in 0..3 {
            for j in 0..4 {
                let p = grid[i * 4 + j];
                expected += if data.get(i, j) == 1 { p.ln() } else { (1.0 - p).ln() };
            }
        }
        let got = model.log_likelihood(&d, &z).unwrap();
        assert!((got - expected).abs() < 1e-10, "{got} vs {expected}");
    }

    #[test]
    fn test_log_odds_matches_joint_difference() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let d = [0.9, 0.55, 0.7];
        let logit_d: Vec<f64> = d.iter().map(|&x: &f64| (x / (1.0 - x)).ln()).collect();
        for j in 0..4 {
            let mut z1 = vec![1u8, 0, 1, 1];
            let mut z0 = z1.clone();
            z1[j] = 1;
            z0[j] = 0;
            let diff = model.log_joint(&d, &z1).unwrap() - model.log_joint(&d, &z0).unwrap();
            let odds = model.consensus_log_odds(j, &logit_d);
            assert!((diff - odds).abs() < 1e-10, "item {j}: {diff} vs {odds}");
        }
    }

    #[test]
    fn test_competence_density_gradient() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let z = [1, 0, 1, 1];
        let agree = model.agreements(&z);
        assert_eq!(agree, vec![4, 2, 3]);
        let theta = [0.3, -1.2, 2.5];
        let mut grad = [0.0; 3];
        model.competence_log_density(&theta, &agree, &mut grad);
        let h = 1e-6;
        let mut scratch = [0.0; 3];
        for i in 0..3 {
            let mut up = theta;
            let mut down = theta;
            up[i] += h;
            down[i] -= h;
            let fd = (model.competence_log_density(&up, &agree, &mut scratch)
                - model.competence_log_density(&down, &agree, &mut scratch))
                / (2.0 * h);
            assert!((fd - grad[i]).abs() < 1e-5, "coord {i}: {fd} vs {}", grad[i]);
        }
    }

    #[test]
    fn test_competence_density_tracks_likelihood() {
        let data = small();
        let model = CctModel::new(&data).unwrap();
        let z = [1, 0, 1, 1];
        let agree = model.agreements(&z);
        let theta = [0.3, -1.2, 2.5];
        let d: Vec<f64> = theta.iter().map(|&t| competence(t)).collect();
        let mut grad = [0.0; 3];
        let lp = model.competence_log_density(&theta, &agree, &mut grad);
        let jac: f64 = theta
            .iter()
            .map(|&t| {
                let s = sigmoid(t);
                (0.5 * s * (1.0 - s)).ln()
            })
            .sum();
        let ll = model.log_likelihood(&d, &z).unwrap();
        assert!((lp - jac - ll).abs() < 1e-10);
    }

    #[test]
    fn test_transform_round_trip_and_bounds() {
        for &d in &[0.51, 0.75, 0.99] {
            assert!((competence(unconstrained(d)) - d).abs() < 1e-12);
        }
        assert!(competence(-800.0) >= COMPETENCE_LOWER);
        assert!(competence(800.0) <= COMPETENCE_UPPER);
        let (ln_d, ln_not_d) = log_competence_pair(60.0);
        assert!(ln_d.is_finite() && ln_not_d.is_finite());
    }

    proptest! {
        #[test]
        fn prop_link_stays_in_unit_interval(d in 0.5f64..=1.0, z in 0u8..=1) {
            let p = response_probability(d, z);
            prop_assert!((0.0..=1.0).contains(&p));
            if z == 1 {
                prop_assert!((p - d).abs() < 1e-15);
                prop_assert!(p >= 0.5);
            } else {
                prop_assert!((p - (1.0 - d)).abs() < 1e-15);
                prop_assert!(p <= 0.5);
            }
        }

        #[test]
        fn prop_competence_in_bounds(theta in -50.0f64..50.0) {
            let d = competence(theta);
            prop_assert!((COMPETENCE_LOWER..=COMPETENCE_UPPER).contains(&d));
        }
    }
}
