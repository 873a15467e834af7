//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! End-to-end consensus analysis.
//!
//! [`analyze`] runs the whole pipeline on a validated response matrix:
//! model construction, multi-chain sampling, summaries, the consensus key
//! and its comparison with the majority vote.

use crate::config::AnalysisConfig;
use crate::consensus::{differences, majority_vote};
use crate::data::ResponseMatrix;
use crate::error::Result;
use crate::model::CctModel;
use crate::sampler::{sample, RunHealth, Trace};
use crate::summary::{summarize, PosteriorSummary};

/// Everything produced by one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Options the run used.
    pub config: AnalysisConfig,
    /// Retained posterior draws.
    pub trace: Trace,
    /// Per-parameter summaries.
    pub summary: PosteriorSummary,
    /// Model answer key (`mean(Z) > 0.5`).
    pub consensus: Vec<u8>,
    /// Majority-vote answer key from the raw responses.
    pub majority_vote: Vec<u8>,
    /// `true` where the two keys disagree.
    pub differences: Vec<bool>,
}

impl Analysis {
    /// Run verdict from the divergence count.
    pub fn health(&self) -> RunHealth {
        self.trace.health()
    }
}

/// Fits the consensus model to `data` and summarises the posterior.
pub fn analyze(data: &ResponseMatrix, config: &AnalysisConfig) -> Result<Analysis> {
    config.validate()?;
    let model = CctModel::new(data)?;
    let trace = sample(&model, &config.sampler)?;
    let summary = summarize(&trace, config.hdi_prob)?;
    let consensus = summary.answer_key();
    let majority_vote = majority_vote(data);
    let differences = differences(&consensus, &majority_vote)?;
    Ok(Analysis {
        config: config.clone(),
        trace,
        summary,
        consensus,
        majority_vote,
        differences,
    })
}
