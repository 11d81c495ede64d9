use nalgebra::DMatrix;

use crate::error::{Result, WjglmError};
use crate::model::GroupLayout;

use super::location::LocationEstimate;

/// Block-diagonal covariance estimates for the G*W cell locations.
#[derive(Debug, Clone)]
pub struct Dispersion {
    /// Covariance of the cell location estimates used by the test statistic.
    /// Group block `i` is `EᵢᵗEᵢ / ((df_i + 1) df_i)` where `Eᵢ` holds the
    /// (winsorized) residuals of group `i`.
    pub sigma: DMatrix<f64>,
    /// Conventional (winsorized) variance-covariance matrix, `EᵢᵗEᵢ / (n_i - 1)`
    /// per block. Only used to standardize effect sizes.
    pub standardizer: DMatrix<f64>,
}

/// Build SIGMA and STDIZER from a location estimate.
///
/// Cross-group blocks are exactly zero: groups are independent samples.
pub fn estimate_dispersion(location: &LocationEstimate, layout: &GroupLayout) -> Result<Dispersion> {
    let yt = &location.y_transformed;
    let n_groups = layout.n_groups();
    let n_cond = yt.ncols();

    if location.bhat_winsorized.shape() != (n_groups, n_cond) || location.df.len() != n_groups {
        return Err(WjglmError::DimensionMismatch {
            expected: n_groups,
            got: location.df.len(),
            context: "groups in location estimate vs. layout".into(),
        });
    }

    let dim = n_groups * n_cond;
    let mut sigma = DMatrix::zeros(dim, dim);
    let mut standardizer = DMatrix::zeros(dim, dim);

    for i in 0..n_groups {
        let rows = layout.rows(i);
        let n_i = layout.size(i) as f64;
        let df = location.df[i];

        let mut resid = yt.rows(rows.start, rows.len()).into_owned();
        let centre = location.bhat_winsorized.row(i);
        for mut row in resid.row_iter_mut() {
            row -= &centre;
        }

        let cross = resid.transpose() * &resid;
        let block = &cross / ((df + 1.0) * df);
        let start = i * n_cond;
        standardizer
            .view_mut((start, start), (n_cond, n_cond))
            .copy_from(&(&block * ((df + 1.0) * df) / (n_i - 1.0)));
        sigma.view_mut((start, start), (n_cond, n_cond)).copy_from(&block);
    }

    Ok(Dispersion {
        sigma,
        standardizer,
    })
}
