use nalgebra::DMatrix;

use crate::error::{Result, WjglmError};
use crate::estimate::{estimate_dispersion, estimate_location, Dispersion, LocationEstimate, Trimming};
use crate::inference::{contrast_test, ContrastTest};
use crate::matrix::dense::contrast_matrix;

use super::design::{design_matrix, GroupLayout};

/// Everything about a test that does not depend on the observed values:
/// group layout, design matrix, contrast and location estimator.
///
/// The same design is refitted on the original data and on every bootstrap
/// resample.
#[derive(Debug, Clone)]
pub struct TestDesign {
    pub layout: GroupLayout,
    /// (N x G) group-indicator matrix.
    pub x: DMatrix<f64>,
    /// Combined contrast `C ⊗ Uᵗ`.
    pub contrast: DMatrix<f64>,
    pub trimming: Trimming,
    /// Number of within-subject conditions (W).
    pub n_conditions: usize,
}

/// One pass of location, dispersion and test statistic.
#[derive(Debug, Clone)]
pub struct Fit {
    pub location: LocationEstimate,
    pub dispersion: Dispersion,
    pub test: ContrastTest,
}

impl TestDesign {
    /// Assemble a design from the between contrast `c` (rows x G) and the
    /// within contrast `u` (W x columns).
    pub fn new(layout: GroupLayout, c: &DMatrix<f64>, u: &DMatrix<f64>, trimming: Trimming) -> Result<Self> {
        if c.ncols() != layout.n_groups() {
            return Err(WjglmError::DimensionMismatch {
                expected: layout.n_groups(),
                got: c.ncols(),
                context: "number of between group cells vs. terms in contrast C".into(),
            });
        }
        let x = design_matrix(&layout)?;
        Ok(Self {
            layout,
            x,
            contrast: contrast_matrix(c, u),
            trimming,
            n_conditions: u.nrows(),
        })
    }

    /// Location and dispersion only.
    pub fn estimate(&self, y: &DMatrix<f64>) -> Result<(LocationEstimate, Dispersion)> {
        if y.ncols() != self.n_conditions {
            return Err(WjglmError::DimensionMismatch {
                expected: self.n_conditions,
                got: y.ncols(),
                context: "number of within group cells vs. terms in contrast U".into(),
            });
        }
        let location = estimate_location(y, &self.x, &self.layout, self.trimming)?;
        let dispersion = estimate_dispersion(&location, &self.layout)?;
        Ok((location, dispersion))
    }

    /// Full fit including the Welch-James ADF statistic.
    pub fn fit(&self, y: &DMatrix<f64>) -> Result<Fit> {
        let (location, dispersion) = self.estimate(y)?;
        let test = contrast_test(
            &dispersion.sigma,
            &location.muhat,
            &self.contrast,
            &location.df,
            self.n_conditions,
        )?;
        Ok(Fit {
            location,
            dispersion,
            test,
        })
    }

    /// Degrees of freedom of the contrast (rows of R).
    pub fn df1(&self) -> usize {
        self.contrast.nrows()
    }
}
