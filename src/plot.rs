//! Text renderings of posterior distributions.
//!
//! Competences are drawn as one histogram strip per informant over the
//! prior range `[0.5, 1]`; consensus answers as one bar per item showing
//! `P(Z = 1)`.  Both figures annotate the mean and the HDI from the
//! summary rows they are given.

use crate::model::{COMPETENCE_LOWER, COMPETENCE_UPPER};
use crate::sampler::Trace;
use crate::summary::PosteriorSummary;
use std::fmt::Write as _;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const BINS: usize = 25;
const BAR_WIDTH: usize = 30;

/// Histogram strip of `values` over `[lo, hi]` using block characters.
pub fn sparkline(values: impl IntoIterator<Item = f64>, lo: f64, hi: f64, bins: usize) -> String {
    let bins = bins.max(1);
    let mut counts = vec![0usize; bins];
    let width = (hi - lo) / bins as f64;
    for v in values {
        if !v.is_finite() || width <= 0.0 {
            continue;
        }
        let idx = (((v - lo) / width).floor().max(0.0) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let peak = counts.iter().copied().max().unwrap_or(0);
    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                ' '
            } else {
                let level = (c * (LEVELS.len() - 1) + peak - 1) / peak;
                LEVELS[level.min(LEVELS.len() - 1)]
            }
        })
        .collect()
}

/// Posterior figure for the competences.
pub fn competence_plot(trace: &Trace, summary: &PosteriorSummary) -> String {
    let pct = (summary.hdi_prob * 100.0).round();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Posterior of D (competence), range [{COMPETENCE_LOWER}, {COMPETENCE_UPPER}]"
    );
    for (i, row) in summary.competence.iter().enumerate() {
        let draws = trace.competence_draws(i);
        let strip = sparkline(
            draws.iter().flatten().copied(),
            COMPETENCE_LOWER,
            COMPETENCE_UPPER,
            BINS,
        );
        let _ = writeln!(
            out,
            "{:<7} |{strip}| mean {:.3}  {pct}% HDI [{:.3}, {:.3}]",
            row.name, row.mean, row.hdi_lower, row.hdi_upper
        );
    }
    out
}

/// Posterior figure for the consensus answers.
pub fn consensus_plot(summary: &PosteriorSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Posterior of Z (consensus), P(Z = 1)");
    for row in &summary.consensus {
        let filled = ((row.mean * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
        let _ = writeln!(
            out,
            "{:<7} |{}{}| {:.3}",
            row.name,
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            row.mean
        );
    }
    out
}
