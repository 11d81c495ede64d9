use std::ops::Range;

use nalgebra::DMatrix;

use crate::error::{Result, WjglmError};

/// Partition of the observation rows into contiguous between-subject groups.
///
/// Rows `0..sizes[0]` belong to group 0, the next `sizes[1]` rows to group 1,
/// and so on. Every group-aware stage (location, dispersion, resampling)
/// walks the data through this layout instead of re-deriving offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    sizes: Vec<usize>,
    offsets: Vec<usize>,
}

impl GroupLayout {
    /// Build a layout from per-group sizes.
    ///
    /// # Errors
    /// `DegenerateGroup` if any group is empty, `InvalidParameter` if there
    /// are no groups at all.
    pub fn new(sizes: &[usize]) -> Result<Self> {
        if sizes.is_empty() {
            return Err(WjglmError::InvalidParameter(
                "at least one between-subject group is required".into(),
            ));
        }
        if let Some(group) = sizes.iter().position(|&n| n == 0) {
            return Err(WjglmError::DegenerateGroup {
                group,
                reason: "group has no subjects".into(),
            });
        }

        let mut offsets = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &n in sizes {
            offsets.push(start);
            start += n;
        }

        Ok(Self {
            sizes: sizes.to_vec(),
            offsets,
        })
    }

    /// Number of groups (G).
    pub fn n_groups(&self) -> usize {
        self.sizes.len()
    }

    /// Total number of subjects (N).
    pub fn n_total(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Size of group `i`.
    pub fn size(&self, i: usize) -> usize {
        self.sizes[i]
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Row range occupied by group `i`.
    pub fn rows(&self, i: usize) -> Range<usize> {
        self.offsets[i]..self.offsets[i] + self.sizes[i]
    }

    /// Integer group label of every row, in row order.
    pub fn labels(&self) -> Vec<usize> {
        self.sizes
            .iter()
            .enumerate()
            .flat_map(|(group, &n)| std::iter::repeat(group).take(n))
            .collect()
    }
}

/// Build the (N x G) one-hot group-indicator matrix from integer labels.
///
/// Row `r` has a single 1.0 in column `labels[r]`.
///
/// # Errors
/// `DimensionMismatch` if a label is not below `n_groups`.
pub fn group_indicator(labels: &[usize], n_groups: usize) -> Result<DMatrix<f64>> {
    let mut x = DMatrix::zeros(labels.len(), n_groups);
    for (row, &label) in labels.iter().enumerate() {
        if label >= n_groups {
            return Err(WjglmError::DimensionMismatch {
                expected: n_groups,
                got: label + 1,
                context: format!("group label of row {}", row),
            });
        }
        x[(row, label)] = 1.0;
    }
    Ok(x)
}

/// Design matrix for a [`GroupLayout`]: the group indicator of its row labels.
pub fn design_matrix(layout: &GroupLayout) -> Result<DMatrix<f64>> {
    group_indicator(&layout.labels(), layout.n_groups())
}
