//! Report rendering and persistence.
//!
//! The text report mirrors what the command line prints; the JSON report
//! carries the same content plus every summary column for downstream tools.

use crate::analysis::Analysis;
use crate::config::AnalysisConfig;
use crate::data::ResponseMatrix;
use crate::error::{CctError, Result};
use crate::plot::{competence_plot, consensus_plot};
use crate::sampler::RunHealth;
use crate::summary::PosteriorSummary;
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serializable view of a finished analysis.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Number of informants.
    pub informants: usize,
    /// Number of items.
    pub items: usize,
    /// Informant identifiers from the input.
    pub informant_ids: &'a [String],
    /// Item labels from the input header.
    pub item_labels: &'a [String],
    /// Options the run used.
    pub config: &'a AnalysisConfig,
    /// Per-parameter summaries.
    pub summary: &'a PosteriorSummary,
    /// Model answer key.
    pub consensus: &'a [u8],
    /// Majority-vote answer key.
    pub majority_vote: &'a [u8],
    /// Item-wise disagreement of the two keys.
    pub differences: &'a [bool],
    /// Divergent retained draws.
    pub divergences: usize,
    /// Retained draws across chains.
    pub total_draws: usize,
    /// Run verdict.
    pub health: RunHealth,
}

impl<'a> Report<'a> {
    /// Builds the report view of `analysis` over its input `data`.
    pub fn new(analysis: &'a Analysis, data: &'a ResponseMatrix) -> Self {
        Self {
            informants: data.informants(),
            items: data.items(),
            informant_ids: data.informant_ids(),
            item_labels: data.item_labels(),
            config: &analysis.config,
            summary: &analysis.summary,
            consensus: &analysis.consensus,
            majority_vote: &analysis.majority_vote,
            differences: &analysis.differences,
            divergences: analysis.trace.divergences(),
            total_draws: analysis.trace.len(),
            health: analysis.trace.health(),
        }
    }
}

fn vector_line<T: ToString>(values: &[T]) -> String {
    let body = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{body}]")
}

/// Renders the human-readable report.
pub fn render_text(analysis: &Analysis, with_plots: bool) -> String {
    let mut sections = vec![analysis.summary.render_table()];
    if with_plots {
        sections.push(competence_plot(&analysis.trace, &analysis.summary));
        sections.push(consensus_plot(&analysis.summary));
    }
    sections.push(format!(
        "Consensus answers from model:\n {}\n",
        vector_line(&analysis.consensus)
    ));
    sections.push(format!(
        "Majority vote answers:\n {}\n",
        vector_line(&analysis.majority_vote)
    ));
    sections.push(format!(
        "Difference (true = different):\n {}\n",
        vector_line(&analysis.differences)
    ));
    let verdict = match analysis.trace.health() {
        RunHealth::Reliable => "reliable".to_string(),
        RunHealth::Unreliable { rate, .. } => {
            format!("UNRELIABLE: divergence rate {:.1}%", rate * 100.0)
        }
    };
    let rhat = analysis
        .summary
        .max_rhat()
        .map_or_else(|| "-".to_string(), |r| format!("{r:.3}"));
    sections.push(format!(
        "Divergences: {} of {} draws ({verdict}); max r_hat {rhat}\n",
        analysis.trace.divergences(),
        analysis.trace.len(),
    ));
    sections.join("\n")
}

/// Writes `report` as pretty-printed JSON to `path`, creating parent
/// directories as needed.
pub fn write_json_report(path: impl AsRef<Path>, report: &Report<'_>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir).map_err(|err| CctError::io(dir, err))?;
    }
    let file = File::create(path).map_err(|err| CctError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|err| CctError::io(path, err))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::SamplerConfig;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn small_analysis() -> (Analysis, ResponseMatrix) {
        let data = ResponseMatrix::from_csv_reader(
            "Informant,Q1,Q2,Q3\nP1,1,0,1\nP2,1,0,1\nP3,1,1,1\nP4,0,0,1\n".as_bytes(),
        )
        .unwrap();
        let config = AnalysisConfig {
            sampler: SamplerConfig {
                draws: 100,
                tune: 100,
                chains: 2,
                ..SamplerConfig::default()
            },
            ..AnalysisConfig::default()
        };
        (analyze(&data, &config).unwrap(), data)
    }

    #[test]
    fn test_vector_line() {
        assert_eq!(vector_line(&[1u8, 0, 1]), "[1 0 1]");
        assert_eq!(vector_line(&[true, false]), "[true false]");
        assert_eq!(vector_line::<u8>(&[]), "[]");
    }

    #[test]
    fn test_render_text_sections() {
        let (analysis, _) = small_analysis();
        let text = render_text(&analysis, true);
        assert!(text.contains("Posterior of D"));
        assert!(text.contains("Consensus answers from model:"));
        assert!(text.contains("Majority vote answers:\n [1 0 1]"));
        assert!(text.contains("Divergences:"));
        assert!(!render_text(&analysis, false).contains("Posterior of D"));
    }

    #[test]
    fn test_write_json_report() {
        let (analysis, data) = small_analysis();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let tmp_dir = std::env::temp_dir().join(format!("cct_report_test_{unique}"));
        let path = write_json_report(tmp_dir.join("nested/report.json"), &Report::new(&analysis, &data))
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["informants"], 4);
        assert_eq!(value["item_labels"][2], "Q3");
        assert_eq!(value["majority_vote"], serde_json::json!([1, 0, 1]));
        assert_eq!(value["total_draws"], 200);
        assert_eq!(value["summary"]["competence"].as_array().unwrap().len(), 4);
        assert!(value["health"]["status"].is_string());
        fs::remove_dir_all(&tmp_dir).unwrap();
    }
}
