//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! No-U-Turn Sampler for the continuous block.
//!
//! The trajectory is grown by repeated doubling in a random direction until
//! it makes a U-turn, hits the maximum depth or diverges.  Proposals are
//! drawn multinomially from the trajectory with weights `exp(−ΔH)`, biased
//! towards the newest subtree at the top level.  During tuning the step size
//! follows Nesterov dual averaging toward the configured acceptance target;
//! afterwards it is frozen at the averaged value.
//!
//! The mass matrix is the identity.

use rand::Rng;
use rand_distr::StandardNormal;

/// Energy error beyond which a transition is flagged as divergent.
pub const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// A differentiable log density over unconstrained coordinates.
pub trait GradientTarget {
    /// Returns `log p(q)` and writes `∇ log p(q)` into `grad`.
    fn log_density_and_grad(&self, q: &[f64], grad: &mut [f64]) -> f64;
}

#[derive(Debug, Clone)]
struct PhasePoint {
    q: Vec<f64>,
    p: Vec<f64>,
    grad: Vec<f64>,
    log_density: f64,
}

impl PhasePoint {
    fn hamiltonian(&self) -> f64 {
        let kinetic: f64 = self.p.iter().map(|v| v * v).sum::<f64>() * 0.5;
        kinetic - self.log_density
    }
}

fn leapfrog<T: GradientTarget>(target: &T, from: &PhasePoint, eps: f64) -> PhasePoint {
    let mut next = from.clone();
    for (p, g) in next.p.iter_mut().zip(&from.grad) {
        *p += 0.5 * eps * g;
    }
    for (q, p) in next.q.iter_mut().zip(&next.p) {
        *q += eps * p;
    }
    next.log_density = target.log_density_and_grad(&next.q, &mut next.grad);
    for (p, g) in next.p.iter_mut().zip(&next.grad) {
        *p += 0.5 * eps * g;
    }
    next
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

fn is_turning(left: &PhasePoint, right: &PhasePoint) -> bool {
    let mut dot_left = 0.0;
    let mut dot_right = 0.0;
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * left.p[i];
        dot_right += dq * right.p[i];
    }
    dot_left < 0.0 || dot_right < 0.0
}

struct Subtree {
    left: PhasePoint,
    right: PhasePoint,
    proposal: PhasePoint,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept: f64,
    divergent: bool,
    turning: bool,
}

impl Subtree {
    fn invalid(&self) -> bool {
        self.divergent || self.turning
    }

    fn edge(&self, direction: f64) -> &PhasePoint {
        if direction > 0.0 {
            &self.right
        } else {
            &self.left
        }
    }

    fn extend(&mut self, other: Subtree, direction: f64) {
        if direction > 0.0 {
            self.right = other.right;
        } else {
            self.left = other.left;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_tree<T: GradientTarget, R: Rng>(
    target: &T,
    start: &PhasePoint,
    depth: usize,
    direction: f64,
    eps: f64,
    h0: f64,
    rng: &mut R,
) -> Subtree {
    if depth == 0 {
        let next = leapfrog(target, start, direction * eps);
        let energy_error = next.hamiltonian() - h0;
        // NaN compares false, so a NaN energy is divergent too.
        let divergent = !(energy_error <= DIVERGENCE_THRESHOLD);
        let (log_weight, accept) = if energy_error.is_nan() {
            (f64::NEG_INFINITY, 0.0)
        } else {
            (-energy_error, (-energy_error).exp().min(1.0))
        };
        return Subtree {
            left: next.clone(),
            right: next.clone(),
            proposal: next,
            log_sum_weight: log_weight,
            n_leapfrog: 1,
            sum_accept: accept,
            divergent,
            turning: false,
        };
    }

    let mut inner = build_tree(target, start, depth - 1, direction, eps, h0, rng);
    if inner.invalid() {
        return inner;
    }
    let outer = build_tree(
        target,
        inner.edge(direction),
        depth - 1,
        direction,
        eps,
        h0,
        rng,
    );

    inner.n_leapfrog += outer.n_leapfrog;
    inner.sum_accept += outer.sum_accept;
    if outer.invalid() {
        inner.divergent |= outer.divergent;
        inner.turning |= outer.turning;
        return inner;
    }

    let merged = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
    if rng.gen::<f64>() < (outer.log_sum_weight - merged).exp() {
        inner.proposal = outer.proposal.clone();
    }
    inner.log_sum_weight = merged;
    inner.extend(outer, direction);
    inner.turning = is_turning(&inner.left, &inner.right);
    inner
}

/// Outcome of one NUTS transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Mean Metropolis acceptance probability over the trajectory.
    pub accept_prob: f64,
    /// Whether the trajectory hit a divergence.
    pub divergent: bool,
    /// Number of completed doublings.
    pub depth: usize,
    /// Leapfrog steps taken.
    pub n_leapfrog: usize,
    /// Hamiltonian at the start of the transition.
    pub energy: f64,
    /// Step size used for this transition.
    pub step_size: f64,
}

/// One NUTS transition starting at `q`, which is updated in place.
pub fn transition<T: GradientTarget, R: Rng>(
    target: &T,
    q: &mut [f64],
    eps: f64,
    max_treedepth: usize,
    rng: &mut R,
) -> Transition {
    let dim = q.len();
    let mut grad = vec![0.0; dim];
    let log_density = target.log_density_and_grad(q, &mut grad);
    let start = PhasePoint {
        q: q.to_vec(),
        p: (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)).collect(),
        grad,
        log_density,
    };
    let h0 = start.hamiltonian();

    let mut tree = Subtree {
        left: start.clone(),
        right: start.clone(),
        proposal: start,
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        sum_accept: 0.0,
        divergent: false,
        turning: false,
    };
    let mut depth = 0;
    while depth < max_treedepth {
        let direction = if rng.gen::<bool>() { 1.0 } else { -1.0 };
        let sub = build_tree(target, tree.edge(direction), depth, direction, eps, h0, rng);
        tree.n_leapfrog += sub.n_leapfrog;
        tree.sum_accept += sub.sum_accept;
        if sub.divergent {
            tree.divergent = true;
            break;
        }
        if sub.turning {
            break;
        }
        depth += 1;
        // Biased progressive sampling favours the newer half.
        if rng.gen::<f64>() < (sub.log_sum_weight - tree.log_sum_weight).exp() {
            tree.proposal = sub.proposal.clone();
        }
        tree.log_sum_weight = log_sum_exp(tree.log_sum_weight, sub.log_sum_weight);
        tree.extend(sub, direction);
        if is_turning(&tree.left, &tree.right) {
            break;
        }
    }

    q.copy_from_slice(&tree.proposal.q);
    Transition {
        accept_prob: tree.sum_accept / tree.n_leapfrog.max(1) as f64,
        divergent: tree.divergent,
        depth,
        n_leapfrog: tree.n_leapfrog,
        energy: h0,
        step_size: eps,
    }
}

/// Heuristic initial step size: doubles or halves a unit step until the
/// one-step acceptance probability crosses 0.5.
pub fn find_reasonable_step_size<T: GradientTarget, R: Rng>(
    target: &T,
    q: &[f64],
    rng: &mut R,
) -> f64 {
    let dim = q.len();
    let mut grad = vec![0.0; dim];
    let log_density = target.log_density_and_grad(q, &mut grad);
    let start = PhasePoint {
        q: q.to_vec(),
        p: (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)).collect(),
        grad,
        log_density,
    };
    let h0 = start.hamiltonian();
    let log_accept = |eps: f64| {
        let delta = h0 - leapfrog(target, &start, eps).hamiltonian();
        if delta.is_nan() {
            f64::NEG_INFINITY
        } else {
            delta
        }
    };

    let mut eps = 1.0;
    let direction = if log_accept(eps) > 0.5f64.ln() { 1.0 } else { -1.0 };
    for _ in 0..64 {
        let crossed = if direction > 0.0 {
            log_accept(eps) <= 0.5f64.ln()
        } else {
            log_accept(eps) > 0.5f64.ln()
        };
        if crossed {
            break;
        }
        eps *= 2f64.powf(direction);
    }
    eps.clamp(1e-8, 1e3)
}

/// Nesterov dual-averaging step-size adaptation (Hoffman & Gelman 2014).
#[derive(Debug, Clone)]
pub struct DualAveraging {
    target_accept: f64,
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    iteration: usize,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    /// Starts adaptation from `initial_step` toward `target_accept`.
    pub fn new(initial_step: f64, target_accept: f64) -> Self {
        Self {
            target_accept,
            mu: (10.0 * initial_step).ln(),
            log_eps: initial_step.ln(),
            log_eps_bar: 0.0,
            h_bar: 0.0,
            iteration: 0,
        }
    }

    /// Feeds the acceptance statistic of the latest transition.
    pub fn update(&mut self, accept_prob: f64) {
        self.iteration += 1;
        let t = self.iteration as f64;
        let eta = 1.0 / (t + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target_accept - accept_prob);
        self.log_eps = self.mu - t.sqrt() / Self::GAMMA * self.h_bar;
        let weight = t.powf(-Self::KAPPA);
        self.log_eps_bar = weight * self.log_eps + (1.0 - weight) * self.log_eps_bar;
    }

    /// Step size to use for the next tuning transition.
    pub fn current(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Averaged step size to freeze once tuning ends.
    pub fn adapted(&self) -> f64 {
        if self.iteration == 0 {
            self.current()
        } else {
            self.log_eps_bar.exp()
        }
    }
}

/// Continuous block of the compound step: NUTS with step-size adaptation.
#[derive(Debug, Clone)]
pub struct NutsBlock {
    target_accept: f64,
    max_treedepth: usize,
    step_size: Option<f64>,
    adaptation: Option<DualAveraging>,
}

impl NutsBlock {
    /// Creates an unadapted block.
    pub fn new(target_accept: f64, max_treedepth: usize) -> Self {
        Self {
            target_accept,
            max_treedepth,
            step_size: None,
            adaptation: None,
        }
    }

    /// Current step size, if one has been chosen.
    pub fn step_size(&self) -> Option<f64> {
        self.step_size
    }

    /// Advances `q` by one transition, adapting the step size while `tuning`.
    pub fn step<T: GradientTarget, R: Rng>(
        &mut self,
        target: &T,
        q: &mut [f64],
        tuning: bool,
        rng: &mut R,
    ) -> Transition {
        let eps = match self.step_size {
            Some(eps) => eps,
            None => {
                let eps = find_reasonable_step_size(target, q, rng);
                self.adaptation = Some(DualAveraging::new(eps, self.target_accept));
                eps
            }
        };
        let outcome = transition(target, q, eps, self.max_treedepth, rng);
        self.step_size = Some(eps);
        if tuning {
            if let Some(adaptation) = self.adaptation.as_mut() {
                adaptation.update(outcome.accept_prob);
                self.step_size = Some(adaptation.current());
            }
        }
        outcome
    }

    /// Freezes the step size at its dual-averaged value.
    pub fn finish_tuning(&mut self) {
        if let Some(adaptation) = self.adaptation.take() {
            self.step_size = Some(adaptation.adapted());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::chain_rng;

    struct StdNormal;

    impl GradientTarget for StdNormal {
        fn log_density_and_grad(&self, q: &[f64], grad: &mut [f64]) -> f64 {
            let mut lp = 0.0;
            for (g, &x) in grad.iter_mut().zip(q) {
                *g = -x;
                lp -= 0.5 * x * x;
            }
            lp
        }
    }

    struct Cliff;

    impl GradientTarget for Cliff {
        fn log_density_and_grad(&self, q: &[f64], grad: &mut [f64]) -> f64 {
            // Extremely stiff quadratic: large steps blow up the energy.
            grad[0] = -1e8 * q[0];
            -0.5e8 * q[0] * q[0]
        }
    }

    #[test]
    fn test_samples_standard_normal_moments() {
        let mut rng = chain_rng(11, 0);
        let mut block = NutsBlock::new(0.8, 10);
        let mut q = vec![3.0, -3.0];
        for _ in 0..300 {
            block.step(&StdNormal, &mut q, true, &mut rng);
        }
        block.finish_tuning();
        let eps = block.step_size().unwrap();
        assert!(eps > 0.1 && eps < 3.0, "adapted step size {eps}");
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n = 2000;
        for _ in 0..n {
            let t = block.step(&StdNormal, &mut q, false, &mut rng);
            assert!(!t.divergent);
            assert_eq!(t.step_size, eps);
            sum += q[0];
            sum_sq += q[0] * q[0];
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert!(mean.abs() < 0.15, "mean {mean}");
        assert!((var - 1.0).abs() < 0.25, "var {var}");
    }

    #[test]
    fn test_oversized_step_is_flagged_divergent() {
        let mut rng = chain_rng(5, 0);
        let mut q = vec![1e-3];
        let t = transition(&Cliff, &mut q, 1.0, 10, &mut rng);
        assert!(t.divergent);
        // The start point is kept when nothing valid was proposed.
        assert!(q[0].is_finite());
    }

    #[test]
    fn test_dual_averaging_moves_toward_target() {
        let mut low = DualAveraging::new(1.0, 0.9);
        for _ in 0..50 {
            low.update(0.2);
        }
        assert!(low.adapted() < 1.0);
        let mut high = DualAveraging::new(1.0, 0.6);
        for _ in 0..50 {
            high.update(1.0);
        }
        assert!(high.adapted() > 1.0);
    }

    #[test]
    fn test_reasonable_step_size_is_finite() {
        let mut rng = chain_rng(1, 0);
        let eps = find_reasonable_step_size(&StdNormal, &[0.5, -0.5, 0.1], &mut rng);
        assert!(eps.is_finite() && eps > 0.0);
    }
}
