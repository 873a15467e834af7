//! Posterior statistics over multi-chain draws.
//!
//! Every function takes draws organised as one vector per chain.  Point
//! statistics flatten across chains; convergence statistics use the chain
//! structure.  Functions that cannot produce a meaningful value (too few
//! draws, zero variance) return `None` rather than `NaN`.

/// Arithmetic mean of all draws.
pub fn mean(chains: &[Vec<f64>]) -> Option<f64> {
    let n: usize = chains.iter().map(Vec::len).sum();
    if n == 0 {
        return None;
    }
    Some(chains.iter().flatten().sum::<f64>() / n as f64)
}

/// Sample standard deviation (`n − 1` denominator) of all draws.
pub fn std_dev(chains: &[Vec<f64>]) -> Option<f64> {
    let n: usize = chains.iter().map(Vec::len).sum();
    let mu = mean(chains)?;
    if n < 2 {
        return Some(0.0);
    }
    let ss: f64 = chains.iter().flatten().map(|x| (x - mu).powi(2)).sum();
    Some((ss / (n - 1) as f64).sqrt())
}

/// Narrowest interval holding a `prob` fraction of the pooled draws.
pub fn hdi(chains: &[Vec<f64>], prob: f64) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = chains.iter().flatten().copied().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let span = ((prob * n as f64).floor() as usize).min(n - 1);
    let lower = (0..n - span)
        .min_by(|&a, &b| {
            let wa = sorted[a + span] - sorted[a];
            let wb = sorted[b + span] - sorted[b];
            wa.total_cmp(&wb)
        })
        .unwrap_or(0);
    Some((sorted[lower], sorted[lower + span]))
}

fn chain_moments(chain: &[f64]) -> (f64, f64) {
    let n = chain.len() as f64;
    let mean = chain.iter().sum::<f64>() / n;
    let var = chain.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

fn variance_of(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    chain_moments(values).1
}

/// Split-chain potential scale reduction factor (Gelman–Rubin R-hat).
///
/// Each chain is cut into halves, so a single chain still yields a value.
/// Returns `None` with fewer than two draws per half or when the draws have
/// no within-chain variance.
pub fn split_rhat(chains: &[Vec<f64>]) -> Option<f64> {
    let half = chains.iter().map(Vec::len).min()? / 2;
    if half < 2 {
        return None;
    }
    let mut means = Vec::with_capacity(chains.len() * 2);
    let mut vars = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        // An odd middle draw is dropped.
        let tail_start = chain.len() - half;
        for part in [&chain[..half], &chain[tail_start..]] {
            let (m, v) = chain_moments(part);
            means.push(m);
            vars.push(v);
        }
    }
    let n = half as f64;
    let w = vars.iter().sum::<f64>() / vars.len() as f64;
    if w <= 0.0 {
        return None;
    }
    let b = n * variance_of(&means);
    let var_plus = (n - 1.0) / n * w + b / n;
    Some((var_plus / w).sqrt())
}

fn autocovariance(chain: &[f64], mean: f64, lag: usize) -> f64 {
    let n = chain.len();
    chain[..n - lag]
        .iter()
        .zip(&chain[lag..])
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum::<f64>()
        / n as f64
}

/// Multi-chain effective sample size with Geyer's initial monotone
/// sequence estimator, as used by Stan.
///
/// Returns `None` with fewer than four draws per chain or zero variance.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(Vec::len).min()?;
    let m = chains.len();
    if n < 4 {
        return None;
    }
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let moments: Vec<(f64, f64)> = chains.iter().map(|c| chain_moments(c)).collect();
    let means: Vec<f64> = moments.iter().map(|&(mu, _)| mu).collect();
    let mean_var = moments.iter().map(|&(_, v)| v).sum::<f64>() / m as f64;
    let nf = n as f64;
    let var_plus = mean_var * (nf - 1.0) / nf + if m > 1 { variance_of(&means) } else { 0.0 };
    if var_plus <= 0.0 {
        return None;
    }

    let rho = |lag: usize| {
        let acov = chains
            .iter()
            .zip(&means)
            .map(|(c, &mu)| autocovariance(c, mu, lag))
            .sum::<f64>()
            / m as f64;
        1.0 - (mean_var - acov) / var_plus
    };

    // Sum autocorrelation pairs while they stay positive, enforcing a
    // non-increasing pair sequence.
    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = if lag == 0 { 1.0 + rho(1) } else { rho(lag) + rho(lag + 1) };
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        lag += 2;
    }

    let total = (m * n) as f64;
    let tau = tau.max(1.0 / total.log10());
    Some(total / tau)
}

/// Monte-Carlo standard error of the mean, `sd / sqrt(ess)`.
pub fn mcse_mean(sd: f64, ess: Option<f64>) -> Option<f64> {
    ess.filter(|&e| e > 0.0).map(|e| sd / e.sqrt())
}
