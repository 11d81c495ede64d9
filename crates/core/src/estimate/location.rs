use nalgebra::{DMatrix, DVector};

use crate::error::{Result, WjglmError};
use crate::matrix::dense::pseudo_inverse;
use crate::model::GroupLayout;

/// Largest admissible symmetric trimming fraction.
pub const MAX_TRIM_FRACTION: f64 = 0.49;

/// Location estimator applied to every group x condition cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Trimming {
    /// Ordinary least-squares cell means.
    #[default]
    None,
    /// Symmetric trimmed means with winsorized values; the fraction is
    /// trimmed from each tail.
    Symmetric(f64),
}

impl Trimming {
    /// Fraction trimmed from each tail (0 for ordinary means).
    pub fn fraction(&self) -> f64 {
        match *self {
            Trimming::None => 0.0,
            Trimming::Symmetric(per) => per,
        }
    }

    pub fn is_robust(&self) -> bool {
        matches!(self, Trimming::Symmetric(_))
    }
}

/// Output of the location stage.
#[derive(Debug, Clone)]
pub struct LocationEstimate {
    /// Cell location estimates, group-major then condition (length G*W).
    pub muhat: DVector<f64>,
    /// Cell means (trimmed on the robust path), G x W. Used to re-centre
    /// bootstrap resamples.
    pub bhat: DMatrix<f64>,
    /// Winsorized cell means, G x W. Centre of the dispersion stage.
    pub bhat_winsorized: DMatrix<f64>,
    /// Data the dispersion stage works on: raw Y, or Y with every cell
    /// clipped to its trim boundaries (row order preserved), N x W.
    pub y_transformed: DMatrix<f64>,
    /// Residual degrees of freedom per group.
    pub df: Vec<f64>,
}

/// Estimate cell locations for the observation matrix `y` (N x W).
///
/// `x` is the (N x G) group-indicator matrix for `layout`. Without trimming
/// the cell means come from the normal equations solved through a
/// pseudo-inverse of `XᵗX`; with trimming each cell is sorted, `g =
/// floor(per * n_i)` values are dropped from each tail and the remaining
/// boundary values are used to winsorize the cell.
///
/// # Errors
/// `DimensionMismatch` for inconsistent shapes, `DegenerateGroup` when a
/// group is left with zero residual degrees of freedom.
pub fn estimate_location(
    y: &DMatrix<f64>,
    x: &DMatrix<f64>,
    layout: &GroupLayout,
    trimming: Trimming,
) -> Result<LocationEstimate> {
    let n_total = layout.n_total();
    let n_groups = layout.n_groups();
    let n_cond = y.ncols();

    if y.nrows() != n_total {
        return Err(WjglmError::DimensionMismatch {
            expected: n_total,
            got: y.nrows(),
            context: "rows of observation matrix vs. total group size".into(),
        });
    }
    if x.shape() != (n_total, n_groups) {
        return Err(WjglmError::DimensionMismatch {
            expected: n_groups,
            got: x.ncols(),
            context: "columns of design matrix vs. number of groups".into(),
        });
    }

    let CellEstimates {
        bhat,
        bhat_winsorized,
        y_transformed,
        df,
    } = match trimming {
        Trimming::None => {
            let xt = x.transpose();
            let xtx_pinv = pseudo_inverse(&(&xt * x));
            let bhat = xtx_pinv * xt * y;
            CellEstimates {
                bhat_winsorized: bhat.clone(),
                bhat,
                y_transformed: y.clone(),
                df: layout.sizes().iter().map(|&n| n as f64 - 1.0).collect(),
            }
        }
        Trimming::Symmetric(per) => trimmed_cells(y, layout, per)?,
    };

    if let Some(group) = df.iter().position(|&d| d <= 0.0) {
        return Err(WjglmError::DegenerateGroup {
            group,
            reason: format!(
                "too few subjects ({}): degrees of freedom is zero",
                layout.size(group)
            ),
        });
    }

    let cells = &bhat;
    let muhat = DVector::from_iterator(
        n_groups * n_cond,
        (0..n_groups).flat_map(|j| (0..n_cond).map(move |k| cells[(j, k)])),
    );

    log::trace!(
        "location: {} groups x {} conditions, trimming={:?}, df={:?}",
        n_groups,
        n_cond,
        trimming,
        df
    );

    Ok(LocationEstimate {
        muhat,
        bhat,
        bhat_winsorized,
        y_transformed,
        df,
    })
}

/// Per-cell output of either location path, before `muhat` is assembled.
struct CellEstimates {
    bhat: DMatrix<f64>,
    bhat_winsorized: DMatrix<f64>,
    y_transformed: DMatrix<f64>,
    df: Vec<f64>,
}

fn trimmed_cells(y: &DMatrix<f64>, layout: &GroupLayout, per: f64) -> Result<CellEstimates> {
    let n_groups = layout.n_groups();
    let n_cond = y.ncols();

    let mut bhat = DMatrix::zeros(n_groups, n_cond);
    let mut bhat_w = DMatrix::zeros(n_groups, n_cond);
    let mut yt = y.clone();
    let mut df = Vec::with_capacity(n_groups);

    for j in 0..n_groups {
        let n = layout.size(j);
        let g = (per * n as f64).floor() as usize;
        if 2 * g >= n {
            return Err(WjglmError::DegenerateGroup {
                group: j,
                reason: format!("trimming {} of {} subjects from each tail leaves no data", g, n),
            });
        }
        let kept = n - 2 * g;
        df.push(kept as f64 - 1.0);

        let rows = layout.rows(j);
        for k in 0..n_cond {
            let mut sorted: Vec<f64> = rows.clone().map(|r| y[(r, k)]).collect();
            sorted.sort_by(|a, b| b.total_cmp(a));

            let trimmed = &sorted[g..n - g];
            bhat[(j, k)] = trimmed.iter().sum::<f64>() / kept as f64;

            // Sorted descending: first kept value is the upper boundary.
            let max_t = trimmed[0];
            let min_t = trimmed[kept - 1];

            let mut winsorized_sum = 0.0;
            for r in rows.clone() {
                let v = &mut yt[(r, k)];
                if *v <= min_t {
                    *v = min_t;
                }
                if *v >= max_t {
                    *v = max_t;
                }
                winsorized_sum += *v;
            }
            bhat_w[(j, k)] = winsorized_sum / n as f64;
        }
    }

    Ok(CellEstimates {
        bhat,
        bhat_winsorized: bhat_w,
        y_transformed: yt,
        df,
    })
}
