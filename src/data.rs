//! Response matrix loading and validation.
//!
//! Survey data arrives as CSV: a header row, then one row per informant
//! whose first cell is an identifier and whose remaining cells are binary
//! answers, one per item.  Everything is validated here so that the model
//! only ever sees a rectangular 0/1 matrix.

use crate::error::{CctError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Immutable N×M matrix of binary responses, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatrix {
    informants: usize,
    items: usize,
    cells: Vec<u8>,
    informant_ids: Vec<String>,
    item_labels: Vec<String>,
}

impl ResponseMatrix {
    /// Builds a matrix from per-informant rows of 0/1 values.
    ///
    /// Identifiers and labels are generated (`I0`, `Q0`, ...).  Every row
    /// must have the width of the first one and contain only 0 or 1.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let items = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(rows.len() * items);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != items {
                return Err(CctError::RaggedRow {
                    row: idx + 1,
                    expected: items,
                    found: row.len(),
                });
            }
            for (col, &value) in row.iter().enumerate() {
                if value > 1 {
                    return Err(CctError::NonBinary {
                        row: idx + 1,
                        column: format!("Q{col}"),
                        value: value.to_string(),
                    });
                }
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            informants: rows.len(),
            items,
            cells,
            informant_ids: (0..rows.len()).map(|i| format!("I{i}")).collect(),
            item_labels: (0..items).map(|j| format!("Q{j}")).collect(),
        })
    }

    /// Loads a matrix from a CSV file on disk.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| CctError::io(path, err))?;
        Self::from_csv_reader(file)
    }

    /// Parses CSV from any reader.
    ///
    /// The header row supplies item labels; the first column of each
    /// record is kept as the informant identifier and excluded from the
    /// responses.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let header = csv.headers()?.clone();
        let width = header.len();
        let item_labels: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
        let items = item_labels.len();

        let mut cells = Vec::new();
        let mut informant_ids = Vec::new();
        for (idx, record) in csv.records().enumerate() {
            let record = record?;
            let row = idx + 1;
            if record.len() != width {
                return Err(CctError::RaggedRow {
                    row,
                    expected: width,
                    found: record.len(),
                });
            }
            informant_ids.push(record.get(0).unwrap_or_default().to_string());
            for (label, raw) in item_labels.iter().zip(record.iter().skip(1)) {
                let value = parse_binary(raw).ok_or_else(|| CctError::NonBinary {
                    row,
                    column: label.clone(),
                    value: raw.to_string(),
                })?;
                cells.push(value);
            }
        }
        Ok(Self {
            informants: informant_ids.len(),
            items,
            cells,
            informant_ids,
            item_labels,
        })
    }

    /// Number of informants (rows).
    #[inline]
    pub fn informants(&self) -> usize {
        self.informants
    }

    /// Number of items (columns).
    #[inline]
    pub fn items(&self) -> usize {
        self.items
    }

    /// Returns `true` when the matrix has no informants or no items.
    pub fn is_empty(&self) -> bool {
        self.informants == 0 || self.items == 0
    }

    /// Response of informant `i` to item `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> u8 {
        self.cells[i * self.items + j]
    }

    /// All responses of informant `i`.
    pub fn row(&self, i: usize) -> &[u8] {
        &self.cells[i * self.items..(i + 1) * self.items]
    }

    /// Iterates over informant rows.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        // chunks_exact panics on zero width
        self.cells.chunks_exact(self.items.max(1)).take(self.informants)
    }

    /// Fraction of informants answering 1 on each item.
    pub fn column_means(&self) -> Vec<f64> {
        if self.informants == 0 {
            return vec![0.0; self.items];
        }
        let mut ones = vec![0usize; self.items];
        for row in self.rows() {
            for (count, &value) in ones.iter_mut().zip(row) {
                *count += value as usize;
            }
        }
        ones.into_iter()
            .map(|count| count as f64 / self.informants as f64)
            .collect()
    }

    /// Informant identifiers taken from the first CSV column.
    pub fn informant_ids(&self) -> &[String] {
        &self.informant_ids
    }

    /// Item labels taken from the CSV header.
    pub fn item_labels(&self) -> &[String] {
        &self.item_labels
    }
}

fn parse_binary(raw: &str) -> Option<u8> {
    match raw {
        "0" => Some(0),
        "1" => Some(1),
        other => match other.parse::<f64>().ok()? {
            v if v == 0.0 => Some(0),
            v if v == 1.0 => Some(1),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Informant,Q1,Q2,Q3\nP1,1,0,1\nP2,1,1,0\nP3,0,0,1.0\n";

    #[test]
    fn test_parse_drops_identifier_column() {
        let matrix = ResponseMatrix::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(matrix.informants(), 3);
        assert_eq!(matrix.items(), 3);
        assert_eq!(matrix.row(0), &[1, 0, 1]);
        assert_eq!(matrix.row(2), &[0, 0, 1]);
        assert_eq!(matrix.informant_ids(), &["P1", "P2", "P3"]);
        assert_eq!(matrix.item_labels(), &["Q1", "Q2", "Q3"]);
    }

    #[test]
    fn test_column_means() {
        let matrix = ResponseMatrix::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        let means = matrix.column_means();
        assert!((means[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((means[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((means[2] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_binary() {
        let input = "id,a,b\nx,1,2\n";
        match ResponseMatrix::from_csv_reader(input.as_bytes()) {
            Err(CctError::NonBinary { row, column, value }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "b");
                assert_eq!(value, "2");
            }
            other => panic!("expected NonBinary, got {other:?}"),
        }
        let input = "id,a\nx,yes\n";
        assert!(matches!(
            ResponseMatrix::from_csv_reader(input.as_bytes()),
            Err(CctError::NonBinary { .. })
        ));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let input = "id,a,b\nx,1,0\ny,1\n";
        match ResponseMatrix::from_csv_reader(input.as_bytes()) {
            Err(CctError::RaggedRow {
                row,
                expected,
                found,
            }) => {
                assert_eq!((row, expected, found), (2, 3, 2));
            }
            other => panic!("expected RaggedRow, got {other:?}"),
        }
        assert!(matches!(
            ResponseMatrix::from_rows(&[vec![1, 0], vec![1]]),
            Err(CctError::RaggedRow { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ResponseMatrix::load_csv("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CctError::Io { .. }));
    }

    #[test]
    fn test_header_only_is_empty() {
        let matrix = ResponseMatrix::from_csv_reader("id,a,b\n".as_bytes()).unwrap();
        assert_eq!(matrix.informants(), 0);
        assert!(matrix.is_empty());
        assert_eq!(matrix.column_means(), vec![0.0, 0.0]);
    }
}
