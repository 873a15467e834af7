//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! Multi-chain compound sampler.
//!
//! One iteration of a chain applies a [`CompoundStep`]: an ordered list of
//! [`Block`]s, each updating its own slice of the latent state.  The
//! continuous block moves the competences with NUTS while the agreement
//! counts of the current key stay fixed; the discrete block then redraws the
//! key given the new competences and the counts are refreshed.
//!
//! Chains are independent tasks on the rayon pool.  Each owns its generator,
//! adaptation state and buffers, borrows the response matrix read-only and
//! hands back a finished [`ChainTrace`]; the collect is the join point.

use crate::config::SamplerConfig;
use crate::error::Result;
use crate::gibbs::GibbsBlock;
use crate::model::{competence, unconstrained, CctModel, COMPETENCE_LOWER, COMPETENCE_UPPER};
use crate::nuts::{GradientTarget, NutsBlock};
use crate::prng::chain_rng;
use rand::Rng;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Latent state owned by one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    /// Unconstrained competences, one per informant.
    pub theta: Vec<f64>,
    /// Current answer key, one per item.
    pub z: Vec<u8>,
    /// Agreement counts of every informant with `z`.
    pub agreements: Vec<usize>,
}

impl ChainState {
    /// Draws an initial state: competences jittered around the prior
    /// midpoint, answers from their Bernoulli(0.5) prior.
    pub fn initial<R: Rng>(model: &CctModel<'_>, jitter: f64, rng: &mut R) -> Self {
        let centre = unconstrained(0.5 * (COMPETENCE_LOWER + COMPETENCE_UPPER));
        let theta = (0..model.informants())
            .map(|_| {
                if jitter > 0.0 {
                    centre + rng.gen_range(-jitter..=jitter)
                } else {
                    centre
                }
            })
            .collect();
        let z: Vec<u8> = (0..model.items()).map(|_| u8::from(rng.gen::<bool>())).collect();
        let agreements = model.agreements(&z);
        Self {
            theta,
            z,
            agreements,
        }
    }

    /// Competences on the natural `[0.5, 1]` scale.
    pub fn competences(&self) -> impl Iterator<Item = f64> + '_ {
        self.theta.iter().map(|&t| competence(t))
    }
}

/// Competence log density for fixed agreement counts.
struct CompetenceTarget<'m, 'a> {
    model: &'m CctModel<'a>,
    agreements: &'m [usize],
}

impl GradientTarget for CompetenceTarget<'_, '_> {
    fn log_density_and_grad(&self, q: &[f64], grad: &mut [f64]) -> f64 {
        self.model.competence_log_density(q, self.agreements, grad)
    }
}

/// One block of the compound step.
#[derive(Debug, Clone)]
pub enum Block {
    /// Gradient-based update of the competences.
    Continuous(NutsBlock),
    /// Exact conditional update of the answer key.
    Discrete(GibbsBlock),
}

/// Per-draw sampler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DrawStats {
    /// The continuous update diverged.
    pub divergent: bool,
    /// Mean acceptance probability of the NUTS trajectory.
    pub accept_prob: f64,
    /// NUTS tree depth.
    pub tree_depth: usize,
    /// Leapfrog steps taken.
    pub n_leapfrog: usize,
    /// Step size used.
    pub step_size: f64,
    /// Hamiltonian at the start of the trajectory.
    pub energy: f64,
    /// Answers changed by the discrete update.
    pub flips: usize,
}

/// Ordered blocks applied once per iteration.
#[derive(Debug, Clone)]
pub struct CompoundStep {
    blocks: Vec<Block>,
}

impl CompoundStep {
    /// Continuous block first, then discrete, as configured.
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            blocks: vec![
                Block::Continuous(NutsBlock::new(config.target_accept, config.max_treedepth)),
                Block::Discrete(GibbsBlock::default()),
            ],
        }
    }

    /// Applies every block in order to `state`.
    pub fn step<R: Rng>(
        &mut self,
        model: &CctModel<'_>,
        state: &mut ChainState,
        tuning: bool,
        rng: &mut R,
    ) -> DrawStats {
        let mut stats = DrawStats::default();
        for block in &mut self.blocks {
            match block {
                Block::Continuous(nuts) => {
                    let target = CompetenceTarget {
                        model,
                        agreements: &state.agreements,
                    };
                    let t = nuts.step(&target, &mut state.theta, tuning, rng);
                    stats.divergent = t.divergent;
                    stats.accept_prob = t.accept_prob;
                    stats.tree_depth = t.depth;
                    stats.n_leapfrog = t.n_leapfrog;
                    stats.step_size = t.step_size;
                    stats.energy = t.energy;
                }
                Block::Discrete(gibbs) => {
                    stats.flips = gibbs.step(model, &state.theta, &mut state.z, rng);
                    model.agreements_into(&state.z, &mut state.agreements);
                }
            }
        }
        stats
    }

    /// Ends adaptation in every block that adapts.
    pub fn finish_tuning(&mut self) {
        for block in &mut self.blocks {
            if let Block::Continuous(nuts) = block {
                nuts.finish_tuning();
            }
        }
    }

    /// Step size of the continuous block.
    pub fn step_size(&self) -> Option<f64> {
        self.blocks.iter().find_map(|block| match block {
            Block::Continuous(nuts) => nuts.step_size(),
            Block::Discrete(_) => None,
        })
    }
}

/// Retained draws of one chain, draw-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainTrace {
    /// Chain index.
    pub chain: usize,
    /// Competence draws, `draws × informants`.
    pub competence: Vec<f64>,
    /// Consensus draws, `draws × items`.
    pub consensus: Vec<u8>,
    /// Statistics of every retained draw.
    pub stats: Vec<DrawStats>,
    /// Step size used for the retained draws; 0 when none were taken.
    pub step_size: f64,
}

impl ChainTrace {
    /// Number of retained draws.
    pub fn draws(&self) -> usize {
        self.stats.len()
    }

    /// Number of divergent retained draws.
    pub fn divergences(&self) -> usize {
        self.stats.iter().filter(|s| s.divergent).count()
    }
}

/// Overall verdict on a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunHealth {
    /// Divergences stayed within the configured rate.
    Reliable,
    /// Too many divergent draws; summaries should not be trusted.
    Unreliable {
        /// Divergent retained draws across all chains.
        divergences: usize,
        /// Divergent fraction of retained draws.
        rate: f64,
    },
}

impl RunHealth {
    /// `true` for [`RunHealth::Reliable`].
    pub fn is_reliable(&self) -> bool {
        matches!(self, RunHealth::Reliable)
    }
}

/// Posterior draws of every chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    informants: usize,
    items: usize,
    chains: Vec<ChainTrace>,
    health: RunHealth,
}

impl Trace {
    /// Assembles a trace from finished chains and classifies its health.
    pub fn new(
        informants: usize,
        items: usize,
        chains: Vec<ChainTrace>,
        max_divergence_rate: f64,
    ) -> Self {
        let total: usize = chains.iter().map(ChainTrace::draws).sum();
        let divergences: usize = chains.iter().map(ChainTrace::divergences).sum();
        let rate = if total == 0 {
            0.0
        } else {
            divergences as f64 / total as f64
        };
        let health = if rate > max_divergence_rate {
            RunHealth::Unreliable { divergences, rate }
        } else {
            RunHealth::Reliable
        };
        Self {
            informants,
            items,
            chains,
            health,
        }
    }

    /// Number of informants.
    pub fn informants(&self) -> usize {
        self.informants
    }

    /// Number of items.
    pub fn items(&self) -> usize {
        self.items
    }

    /// Per-chain buffers.
    pub fn chains(&self) -> &[ChainTrace] {
        &self.chains
    }

    /// Total retained samples across chains.
    pub fn len(&self) -> usize {
        self.chains.iter().map(ChainTrace::draws).sum()
    }

    /// `true` when no draws were retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Divergent retained draws across chains.
    pub fn divergences(&self) -> usize {
        self.chains.iter().map(ChainTrace::divergences).sum()
    }

    /// Run verdict.
    pub fn health(&self) -> RunHealth {
        self.health
    }

    /// Draws of `D[i]`, one vector per chain.
    pub fn competence_draws(&self, i: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.competence.iter().skip(i).step_by(self.informants).copied().collect())
            .collect()
    }

    /// Draws of `Z[j]` as 0.0/1.0, one vector per chain.
    pub fn consensus_draws(&self, j: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| {
                c.consensus
                    .iter()
                    .skip(j)
                    .step_by(self.items)
                    .map(|&z| f64::from(z))
                    .collect()
            })
            .collect()
    }
}

/// Runs one chain to completion.
pub fn run_chain(model: &CctModel<'_>, config: &SamplerConfig, chain: usize) -> ChainTrace {
    let started = Instant::now();
    let mut rng = chain_rng(config.seed, chain);
    let mut state = ChainState::initial(model, config.jitter, &mut rng);
    let mut step = CompoundStep::new(config);
    info!(chain, tune = config.tune, draws = config.draws, "chain started");

    for _ in 0..config.tune {
        step.step(model, &mut state, true, &mut rng);
    }
    step.finish_tuning();
    debug!(chain, step_size = ?step.step_size(), "tuning finished");

    let n = model.informants();
    let m = model.items();
    let mut competence_buf = Vec::with_capacity(config.draws * n);
    let mut consensus_buf = Vec::with_capacity(config.draws * m);
    let mut stats = Vec::with_capacity(config.draws);
    for _ in 0..config.draws {
        stats.push(step.step(model, &mut state, false, &mut rng));
        competence_buf.extend(state.competences());
        consensus_buf.extend_from_slice(&state.z);
    }
    // Without tuning the step size is only chosen by the first draw.
    let step_size = step.step_size().unwrap_or(0.0);

    let trace = ChainTrace {
        chain,
        competence: competence_buf,
        consensus: consensus_buf,
        stats,
        step_size,
    };
    info!(
        chain,
        draws = trace.draws(),
        divergences = trace.divergences(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chain finished"
    );
    trace
}

/// Samples the posterior with `config.chains` independent chains.
///
/// Returns exactly `config.draws` retained draws per chain; tuning
/// iterations are never recorded.  Divergent draws are kept and counted, and
/// a divergence rate above `config.max_divergence_rate` marks the trace
/// [`RunHealth::Unreliable`] without failing.
pub fn sample(model: &CctModel<'_>, config: &SamplerConfig) -> Result<Trace> {
    config.validate()?;
    info!(
        informants = model.informants(),
        items = model.items(),
        chains = config.chains,
        tune = config.tune,
        draws = config.draws,
        target_accept = config.target_accept,
        "sampling"
    );

    #[cfg(not(target_arch = "wasm32"))]
    let chains: Vec<ChainTrace> = (0..config.chains)
        .into_par_iter()
        .map(|chain| run_chain(model, config, chain))
        .collect();
    #[cfg(target_arch = "wasm32")]
    let chains: Vec<ChainTrace> = (0..config.chains)
        .map(|chain| run_chain(model, config, chain))
        .collect();

    let trace = Trace::new(
        model.informants(),
        model.items(),
        chains,
        config.max_divergence_rate,
    );
    if let RunHealth::Unreliable { divergences, rate } = trace.health() {
        warn!(
            divergences,
            rate, "divergence rate exceeds threshold; posterior summaries are unreliable"
        );
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ResponseMatrix;

    fn quick_config() -> SamplerConfig {
        SamplerConfig {
            draws: 120,
            tune: 80,
            chains: 3,
            ..SamplerConfig::default()
        }
    }

    fn survey() -> ResponseMatrix {
        ResponseMatrix::from_rows(&[
            vec![1, 0, 1, 1, 0, 1],
            vec![1, 0, 1, 1, 0, 1],
            vec![1, 0, 1, 0, 0, 1],
            vec![1, 1, 1, 1, 0, 1],
            vec![0, 1, 0, 1, 1, 0],
        ])
        .unwrap()
    }

    #[test]
    fn test_sample_count_excludes_tuning() {
        let data = survey();
        let model = CctModel::new(&data).unwrap();
        let config = quick_config();
        let trace = sample(&model, &config).unwrap();
        assert_eq!(trace.len(), config.chains * config.draws);
        assert_eq!(trace.chains().len(), config.chains);
        for (idx, chain) in trace.chains().iter().enumerate() {
            assert_eq!(chain.chain, idx);
            assert_eq!(chain.draws(), config.draws);
            assert_eq!(chain.competence.len(), config.draws * data.informants());
            assert_eq!(chain.consensus.len(), config.draws * data.items());
        }
        assert_eq!(trace.competence_draws(2)[0].len(), config.draws);
        assert_eq!(trace.consensus_draws(5)[1].len(), config.draws);
    }

    #[test]
    fn test_draws_respect_support() {
        let data = survey();
        let model = CctModel::new(&data).unwrap();
        let untuned = SamplerConfig {
            tune: 0,
            ..quick_config()
        };
        for config in [quick_config(), untuned] {
            let trace = sample(&model, &config).unwrap();
            for chain in trace.chains() {
                assert!(chain
                    .competence
                    .iter()
                    .all(|d| (COMPETENCE_LOWER..=COMPETENCE_UPPER).contains(d)));
                assert!(chain.consensus.iter().all(|&z| z <= 1));
                assert!(chain.step_size.is_finite() && chain.step_size > 0.0);
                assert!(chain.stats.iter().all(|s| s.step_size == chain.step_size));
            }
        }
    }

    #[test]
    fn test_chains_start_independently() {
        let data = survey();
        let model = CctModel::new(&data).unwrap();
        let a = ChainState::initial(&model, 1.0, &mut chain_rng(42, 0));
        let b = ChainState::initial(&model, 1.0, &mut chain_rng(42, 1));
        assert_ne!(a.theta, b.theta);
        assert!(a.competences().all(|d| d > 0.5 && d < 1.0));
    }

    #[test]
    fn test_same_seed_same_trace() {
        let data = survey();
        let model = CctModel::new(&data).unwrap();
        let config = quick_config();
        let first = sample(&model, &config).unwrap();
        let second = sample(&model, &config).unwrap();
        assert_eq!(first, second);
        let other = sample(
            &model,
            &SamplerConfig {
                seed: 7,
                ..config
            },
        )
        .unwrap();
        assert_ne!(first.chains()[0].competence, other.chains()[0].competence);
    }

    #[test]
    fn test_same_seed_same_trace_without_tuning() {
        let data = ResponseMatrix::from_rows(&[vec![1, 0, 1], vec![1, 1, 1]]).unwrap();
        let model = CctModel::new(&data).unwrap();
        let config = SamplerConfig {
            draws: 50,
            tune: 0,
            chains: 2,
            ..SamplerConfig::default()
        };
        let first = sample(&model, &config).unwrap();
        let second = sample(&model, &config).unwrap();
        assert_eq!(first, second);
        assert!(first.chains().iter().all(|c| c.step_size.is_finite()));
    }

    #[test]
    fn test_invalid_config_fails_before_sampling() {
        let data = survey();
        let model = CctModel::new(&data).unwrap();
        let config = SamplerConfig {
            target_accept: 1.5,
            ..SamplerConfig::default()
        };
        assert!(sample(&model, &config).is_err());
    }

    #[test]
    fn test_health_classification() {
        let divergent = DrawStats {
            divergent: true,
            ..DrawStats::default()
        };
        let chain = ChainTrace {
            chain: 0,
            competence: vec![0.7; 4],
            consensus: vec![1; 4],
            stats: vec![divergent, divergent, DrawStats::default(), DrawStats::default()],
            step_size: 0.1,
        };
        let trace = Trace::new(1, 1, vec![chain.clone()], 0.05);
        assert_eq!(
            trace.health(),
            RunHealth::Unreliable {
                divergences: 2,
                rate: 0.5
            }
        );
        assert!(Trace::new(1, 1, vec![chain], 0.5).health().is_reliable());
    }
}
