#![deny(missing_docs)]

//! The design philosophy underlying `cultural_consensus` is statistical, yet plainly computable.
//! Each module encapsulates one step from raw answers to an inferred answer key.
//!
//! # cultural_consensus
//!
//! Cultural Consensus Theory for binary survey answers.  Given a matrix of
//! 0/1 responses from informants to items, the crate jointly infers each
//! informant's competence `D[i]` and the culturally shared answer key
//! `Z[j]`, then compares that key with a naive majority vote.
//!
//! ## Features
//!
//! * **Response data**: [`ResponseMatrix`] loads and validates CSV surveys.
//! * **Model**: [`CctModel`] evaluates the prior, likelihood and the
//!   per-block conditionals of the consensus model.
//! * **Sampler**: [`sample`] runs independent chains in parallel, each
//!   alternating a NUTS update of the competences with an exact Gibbs
//!   update of the answer key.
//! * **Summaries**: [`summarize`] reports mean, sd, HDI, MCSE, ESS and
//!   split R-hat per parameter.
//! * **Analysis**: [`analyze`] chains every step and yields the consensus
//!   key, the majority vote and their differences.
//!
//! ## Usage
//!
//! ```rust
//! use cultural_consensus::{analyze, AnalysisConfig, ResponseMatrix, SamplerConfig};
//!
//! let data = ResponseMatrix::from_rows(&[
//!     vec![1, 0, 1],
//!     vec![1, 0, 1],
//!     vec![1, 1, 1],
//! ])
//! .unwrap();
//! let config = AnalysisConfig {
//!     sampler: SamplerConfig { draws: 100, tune: 100, chains: 2, ..SamplerConfig::default() },
//!     ..AnalysisConfig::default()
//! };
//! let analysis = analyze(&data, &config).unwrap();
//! assert_eq!(analysis.consensus.len(), 3);
//! assert_eq!(analysis.trace.len(), 200);
//! ```

pub mod analysis;
pub mod config;
pub mod consensus;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod gibbs;
pub mod model;
pub mod nuts;
pub mod plot;
pub mod prng;
pub mod report;
pub mod sampler;
pub mod summary;

pub use analysis::{analyze, Analysis};
pub use config::{AnalysisConfig, SamplerConfig};
pub use consensus::{consensus_answers, decide, differences, majority_vote};
pub use data::ResponseMatrix;
pub use error::{CctError, Result};
pub use model::CctModel;
pub use report::{render_text, write_json_report, Report};
pub use sampler::{sample, RunHealth, Trace};
pub use summary::{summarize, ParameterSummary, PosteriorSummary};
