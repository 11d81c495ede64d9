use nalgebra::DMatrix;

use crate::error::{Result, WjglmError};

/// Observations left after removing rows that carry the missing-value code.
#[derive(Debug, Clone)]
pub struct FilteredObservations {
    pub y: DMatrix<f64>,
    pub group_sizes: Vec<usize>,
    /// Number of rows removed.
    pub n_dropped: usize,
}

/// Whether `value` is the missing-value `sentinel`. A NaN sentinel matches NaN.
pub fn is_missing(value: f64, sentinel: f64) -> bool {
    if sentinel.is_nan() {
        value.is_nan()
    } else {
        value == sentinel
    }
}

/// Number of cells of `y` equal to `sentinel`.
pub fn count_missing(y: &DMatrix<f64>, sentinel: f64) -> usize {
    y.iter().filter(|&&v| is_missing(v, sentinel)).count()
}

/// Drop every row of `y` with at least one cell equal to `sentinel`.
///
/// Row order and group order are preserved and `group_sizes` shrinks
/// accordingly.
///
/// # Errors
/// `DimensionMismatch` if the group sizes do not add up to the number of
/// rows, `DegenerateGroup` if a group loses all of its subjects.
pub fn drop_missing(y: &DMatrix<f64>, group_sizes: &[usize], sentinel: f64) -> Result<FilteredObservations> {
    let total: usize = group_sizes.iter().sum();
    if total != y.nrows() {
        return Err(WjglmError::DimensionMismatch {
            expected: y.nrows(),
            got: total,
            context: "number of subjects vs. sum of group sizes".into(),
        });
    }

    let mut keep = Vec::with_capacity(y.nrows());
    let mut sizes = Vec::with_capacity(group_sizes.len());
    let mut start = 0;
    for (group, &n) in group_sizes.iter().enumerate() {
        let before = keep.len();
        for row in start..start + n {
            if !y.row(row).iter().any(|&v| is_missing(v, sentinel)) {
                keep.push(row);
            }
        }
        let kept = keep.len() - before;
        if kept == 0 {
            return Err(WjglmError::DegenerateGroup {
                group,
                reason: "every subject has a missing value".into(),
            });
        }
        sizes.push(kept);
        start += n;
    }

    let n_dropped = y.nrows() - keep.len();
    if n_dropped > 0 {
        log::debug!("dropped {} rows with missing values", n_dropped);
    }

    Ok(FilteredObservations {
        y: y.select_rows(keep.iter()),
        group_sizes: sizes,
        n_dropped,
    })
}
