//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! Posterior summaries.
//!
//! Reduces a [`Trace`] to one row per parameter (`D[i]`, then `Z[j]`) with
//! the posterior mean, standard deviation, highest-density interval,
//! Monte-Carlo error of the mean, effective sample size and split R-hat,
//! and renders those rows as a fixed-width table.

use crate::consensus::consensus_answers;
use crate::diagnostics::{effective_sample_size, hdi, mcse_mean, mean, split_rhat, std_dev};
use crate::error::{CctError, Result};
use crate::sampler::Trace;
use serde::Serialize;
use std::fmt::Write as _;

/// Summary statistics of one scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    /// Parameter name, e.g. `D[3]` or `Z[0]`.
    pub name: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub sd: f64,
    /// Lower bound of the highest-density interval.
    pub hdi_lower: f64,
    /// Upper bound of the highest-density interval.
    pub hdi_upper: f64,
    /// Monte-Carlo standard error of the mean.
    pub mcse_mean: Option<f64>,
    /// Effective sample size.
    pub ess: Option<f64>,
    /// Split potential scale reduction factor.
    pub r_hat: Option<f64>,
}

impl ParameterSummary {
    /// Summarises draws given as one vector per chain.
    pub fn from_chains(name: String, chains: &[Vec<f64>], hdi_prob: f64) -> Result<Self> {
        let mean = mean(chains).ok_or(CctError::EmptyTrace)?;
        let sd = std_dev(chains).ok_or(CctError::EmptyTrace)?;
        let (hdi_lower, hdi_upper) = hdi(chains, hdi_prob).ok_or(CctError::EmptyTrace)?;
        let ess = effective_sample_size(chains);
        Ok(Self {
            name,
            mean,
            sd,
            hdi_lower,
            hdi_upper,
            mcse_mean: mcse_mean(sd, ess),
            ess,
            r_hat: split_rhat(chains),
        })
    }
}

/// Summaries of every competence and consensus parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSummary {
    /// Interval mass used for the HDI columns.
    pub hdi_prob: f64,
    /// One row per informant.
    pub competence: Vec<ParameterSummary>,
    /// One row per item.
    pub consensus: Vec<ParameterSummary>,
}

impl PosteriorSummary {
    /// Posterior mean competence per informant.
    pub fn competence_means(&self) -> Vec<f64> {
        self.competence.iter().map(|p| p.mean).collect()
    }

    /// Posterior probability that each item's answer is 1.
    pub fn consensus_means(&self) -> Vec<f64> {
        self.consensus.iter().map(|p| p.mean).collect()
    }

    /// Answer key from the strict `> 0.5` decision rule.
    pub fn answer_key(&self) -> Vec<u8> {
        consensus_answers(&self.consensus_means())
    }

    /// Largest R-hat over all parameters that have one.
    pub fn max_rhat(&self) -> Option<f64> {
        self.rows()
            .filter_map(|p| p.r_hat)
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))))
    }

    /// All rows, competences first.
    pub fn rows(&self) -> impl Iterator<Item = &ParameterSummary> {
        self.competence.iter().chain(&self.consensus)
    }

    /// Fixed-width table with one row per parameter.
    pub fn render_table(&self) -> String {
        let lower_pct = (1.0 - self.hdi_prob) / 2.0 * 100.0;
        let upper_pct = 100.0 - lower_pct;
        let lower_label = format!("hdi_{}%", trim_pct(lower_pct));
        let upper_label = format!("hdi_{}%", trim_pct(upper_pct));
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<8} {:>7} {:>7} {:>8} {:>8} {:>9} {:>8} {:>6}",
            "", "mean", "sd", lower_label, upper_label, "mcse_mean", "ess", "r_hat"
        );
        for row in self.rows() {
            let _ = writeln!(
                out,
                "{:<8} {:>7.3} {:>7.3} {:>8.3} {:>8.3} {:>9} {:>8} {:>6}",
                row.name,
                row.mean,
                row.sd,
                row.hdi_lower,
                row.hdi_upper,
                fmt_opt(row.mcse_mean, 3),
                fmt_opt(row.ess, 0),
                fmt_opt(row.r_hat, 2),
            );
        }
        out
    }
}

fn trim_pct(pct: f64) -> String {
    let text = format!("{pct:.1}");
    text.trim_end_matches(".0").to_string()
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}

/// Summarises every parameter of a trace.
///
/// Fails with [`CctError::EmptyTrace`] when the trace holds no draws.
pub fn summarize(trace: &Trace, hdi_prob: f64) -> Result<PosteriorSummary> {
    if trace.is_empty() {
        return Err(CctError::EmptyTrace);
    }
    let competence = (0..trace.informants())
        .map(|i| ParameterSummary::from_chains(format!("D[{i}]"), &trace.competence_draws(i), hdi_prob))
        .collect::<Result<Vec<_>>>()?;
    let consensus = (0..trace.items())
        .map(|j| ParameterSummary::from_chains(format!("Z[{j}]"), &trace.consensus_draws(j), hdi_prob))
        .collect::<Result<Vec<_>>>()?;
    Ok(PosteriorSummary {
        hdi_prob,
        competence,
        consensus,
    })
}
