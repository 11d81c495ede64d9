use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Result, WjglmError};

use super::missing::count_missing;

/// Repeated-measures observations loaded from a table, regrouped so that
/// every between-subject group occupies a contiguous block of rows.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    /// (N x W) observations, group blocks in first-appearance order.
    pub y: DMatrix<f64>,
    /// Subjects per group, aligned with `group_names`.
    pub group_sizes: Vec<usize>,
    pub group_names: Vec<String>,
    /// One name per within-subject condition (column of `y`).
    pub condition_names: Vec<String>,
    /// Cells that were empty or `NA` and loaded as NaN.
    pub n_missing_cells: usize,
}

impl ObservationTable {
    /// Read a header CSV with one group column and one numeric column per
    /// within-subject condition.
    ///
    /// Rows are stably regrouped by group label in order of first appearance.
    /// Empty cells and the tokens `NA` / `NaN` load as NaN so they can be
    /// removed with a NaN missing-value code.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a named column is absent,
    /// or a value cell is neither numeric nor a missing token.
    ///
    /// # Examples
    /// ```no_run
    /// use wjglm_core::data::ObservationTable;
    ///
    /// let table = ObservationTable::from_csv("scores.csv", "group", &["pre", "post"]).unwrap();
    /// println!("groups = {:?}", table.group_sizes);
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P, group_column: &str, value_columns: &[&str]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let column_index = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| WjglmError::ColumnNotFound(name.to_string()))
        };

        if value_columns.is_empty() {
            return Err(WjglmError::Data("at least one value column is required".into()));
        }
        let group_idx = column_index(group_column)?;
        let value_idx: Vec<usize> = value_columns
            .iter()
            .map(|name| column_index(name))
            .collect::<Result<_>>()?;

        let mut group_names: Vec<String> = Vec::new();
        // Rows of each group, each row stored as its W values.
        let mut blocks: Vec<Vec<Vec<f64>>> = Vec::new();

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let label = record
                .get(group_idx)
                .ok_or_else(|| WjglmError::Data(format!("row {} has no group value", line + 1)))?;

            let mut values = Vec::with_capacity(value_idx.len());
            for (&col, name) in value_idx.iter().zip(value_columns) {
                let cell = record.get(col).unwrap_or("");
                values.push(parse_cell(cell).ok_or_else(|| {
                    WjglmError::Data(format!(
                        "row {}: column '{}' has non-numeric value '{}'",
                        line + 1,
                        name,
                        cell
                    ))
                })?);
            }

            let group = match group_names.iter().position(|g| g == label) {
                Some(g) => g,
                None => {
                    group_names.push(label.to_string());
                    blocks.push(Vec::new());
                    group_names.len() - 1
                }
            };
            blocks[group].push(values);
        }

        let n_rows: usize = blocks.iter().map(Vec::len).sum();
        if n_rows == 0 {
            return Err(WjglmError::Data("input table has no observations".into()));
        }

        let w = value_columns.len();
        let flat: Vec<f64> = blocks.iter().flatten().flatten().copied().collect();
        let y = DMatrix::from_row_slice(n_rows, w, &flat);
        let n_missing_cells = count_missing(&y, f64::NAN);
        if n_missing_cells > 0 {
            log::warn!(
                "{} empty or NA cells loaded as NaN; filter them with a NaN missing-value code",
                n_missing_cells
            );
        }

        log::debug!(
            "loaded {} subjects in {} groups over {} conditions",
            n_rows,
            group_names.len(),
            w
        );

        Ok(Self {
            y,
            group_sizes: blocks.iter().map(Vec::len).collect(),
            group_names,
            condition_names: value_columns.iter().map(|c| c.to_string()).collect(),
            n_missing_cells,
        })
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}
