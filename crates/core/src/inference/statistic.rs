//! Welch-James statistic with the approximate degrees of freedom correction.
//!
//! For a contrast matrix `R` (df1 x G*W), cell locations `mu` and block
//! diagonal covariance `Sigma`:
//!
//! ```text
//! T    = (R mu)' pinv(R Sigma R') (R mu)                 Johansen (1980)
//! M    = Sigma R' pinv(R Sigma R') R
//! A    = 1/2 * sum_i [ tr((M Q_i)^2) + tr(M Q_i)^2 ] / df_i
//! df2  = df1 (df1 + 2) / (3 A)
//! c    = df1 + 2A - 6A / (df1 + 2)
//! F    = T / c
//! ```
//!
//! `Q_i` is the selector that is the identity on group `i`'s W x W block.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, WjglmError};
use crate::matrix::dense::pseudo_inverse;

/// Result of the contrast test for one fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastTest {
    /// Johansen's statistic before the ADF scaling.
    pub t_statistic: f64,
    /// Approximate F statistic, `T / c`.
    pub f_statistic: f64,
    /// Numerator degrees of freedom (rows of R).
    pub df1: f64,
    /// Approximate denominator degrees of freedom.
    pub df2: f64,
    /// ADF correction term `A`.
    pub adf_correction: f64,
    /// Mean squared error implied by the contrast and the statistic.
    pub mse: f64,
}

/// Compute the Welch-James ADF test for contrast `r`.
///
/// `df` holds the per-group residual degrees of freedom, `n_cond` the number
/// of within-subject conditions (size of each group block). Near-singular
/// `R Sigma R'` is handled by the pseudo-inverse; NaN results are returned
/// as-is.
pub fn contrast_test(
    sigma: &DMatrix<f64>,
    muhat: &DVector<f64>,
    r: &DMatrix<f64>,
    df: &[f64],
    n_cond: usize,
) -> Result<ContrastTest> {
    let dim = muhat.len();
    if r.ncols() != dim {
        return Err(WjglmError::DimensionMismatch {
            expected: dim,
            got: r.ncols(),
            context: "columns of contrast matrix vs. number of cells".into(),
        });
    }
    if sigma.shape() != (dim, dim) {
        return Err(WjglmError::DimensionMismatch {
            expected: dim,
            got: sigma.nrows(),
            context: "covariance matrix dimension".into(),
        });
    }
    if df.len() * n_cond != dim {
        return Err(WjglmError::DimensionMismatch {
            expected: dim,
            got: df.len() * n_cond,
            context: "groups x conditions vs. number of cells".into(),
        });
    }

    let rt = r.transpose();
    let r_mu = r * muhat;
    let rsr_pinv = pseudo_inverse(&(r * sigma * &rt));
    let t_statistic = r_mu.dot(&(&rsr_pinv * &r_mu));

    let m = sigma * &rt * &rsr_pinv * r;

    // M Q_i keeps only group i's columns, so both traces reduce to M's
    // diagonal block for that group.
    let mut a = 0.0;
    for (i, &df_i) in df.iter().enumerate() {
        let start = i * n_cond;
        let block = m.view((start, start), (n_cond, n_cond));
        let tr = block.trace();
        let tr_sq = (&block * &block).trace();
        a += (tr_sq + tr * tr) / df_i;
    }
    a /= 2.0;

    let df1 = r.nrows() as f64;
    let df2 = df1 * (df1 + 2.0) / (3.0 * a);
    let scale = df1 + 2.0 * a - 6.0 * a / (df1 + 2.0);
    let f_statistic = t_statistic / scale;

    let mse = contrast_mse(r, muhat, df, n_cond, f_statistic);

    Ok(ContrastTest {
        t_statistic,
        f_statistic,
        df1,
        df2,
        adf_correction: a,
        mse,
    })
}

/// Mean contrast sum of squares over df1 rows, divided by F.
///
/// Each row's sum of squares is `(r mu)^2 / sum_j r_j^2 / (df_g(j) + 1)`.
fn contrast_mse(
    r: &DMatrix<f64>,
    muhat: &DVector<f64>,
    df: &[f64],
    n_cond: usize,
    f_statistic: f64,
) -> f64 {
    let mut sst = 0.0;
    for row in r.row_iter() {
        let value: f64 = row.iter().zip(muhat.iter()).map(|(c, m)| c * m).sum();
        let weight: f64 = row
            .iter()
            .enumerate()
            .map(|(cell, c)| c * c / (df[cell / n_cond] + 1.0))
            .sum();
        sst += value * value / weight;
    }
    let mst = sst / r.nrows() as f64;
    mst / f_statistic
}
