//! Error types shared by every stage of the consensus pipeline.
//!
//! Input problems surface before a model exists, configuration problems
//! before a sampler runs, and an empty trace before any summary is formed.
//! Divergent transitions are not errors; they are recorded on the trace.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading data, building the model, sampling or
/// summarising posterior draws.
#[derive(Debug, Error)]
pub enum CctError {
    #[error("io error on {}: {source}", path.display())]
    /// Underlying filesystem failure.
    Io {
        /// File that could not be read or written.
        path: PathBuf,
        /// Original I/O error.
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv: {0}")]
    /// The CSV reader rejected the input (including ragged rows).
    Csv(#[from] csv::Error),
    #[error("row {row} has {found} columns, expected {expected}")]
    /// A record does not have the same width as the header.
    RaggedRow {
        /// One-based data row (the header is row 0).
        row: usize,
        /// Column count of the header.
        expected: usize,
        /// Column count of the offending row.
        found: usize,
    },
    #[error("non-binary response {value:?} at row {row}, column {column:?}")]
    /// A response cell is not 0 or 1.
    NonBinary {
        /// One-based data row.
        row: usize,
        /// Header name of the offending column.
        column: String,
        /// Raw cell contents.
        value: String,
    },
    #[error("response matrix needs at least one informant and one item (got {informants}x{items})")]
    /// Zero informants or zero items.
    EmptyModel {
        /// Number of informants supplied.
        informants: usize,
        /// Number of items supplied.
        items: usize,
    },
    #[error("invalid sampler configuration: {0}")]
    /// A sampler option is out of range.
    Config(String),
    #[error("config decode error: {0}")]
    /// JSON encoding or decoding failure.
    Json(#[from] serde_json::Error),
    #[error("trace is empty: no retained draws to summarise")]
    /// Summaries were requested for a trace without draws.
    EmptyTrace,
    #[error("parameter `{name}` has {found} values, model expects {expected}")]
    /// A parameter vector does not match the model dimensions.
    Dimension {
        /// Parameter name (`D`, `Z` or `baseline`).
        name: &'static str,
        /// Expected length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },
}

impl CctError {
    /// Wraps an I/O error together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CctError>;
