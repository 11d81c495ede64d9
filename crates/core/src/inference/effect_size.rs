//! Standardized effect size with a percentile bootstrap interval.
//!
//! Only defined for single degree of freedom between-group contrasts with
//! one within-subject condition; everything else reports NaN.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::{Result, WjglmError};
use crate::estimate::Trimming;
use crate::model::TestDesign;
use crate::resample::{resample, RandomStream};

/// Standard deviation used when the selected cell's variance is exactly zero.
pub const ZERO_SD_FLOOR: f64 = 1.0e-5;

/// Selector code meaning "do not standardize".
pub const LOC_UNSTANDARDIZED: usize = 99;

/// Which variance standardizes the contrast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standardizer {
    /// Raw contrast value (selector code 99).
    Unstandardized,
    /// Square root of the squared-coefficient weighted mean of the cell
    /// variances involved in the contrast (selector code 0).
    PooledCells,
    /// Standard deviation of one cell, zero-based.
    Cell { group: usize, condition: usize },
}

impl Default for Standardizer {
    fn default() -> Self {
        Standardizer::Cell {
            group: 0,
            condition: 0,
        }
    }
}

impl Standardizer {
    /// Decode the (LOC1, LOC2) selector pair: 99 = unstandardized, 0 =
    /// pooled cells, otherwise 1-based group and condition indices.
    pub fn from_loc(loc1: usize, loc2: usize) -> Result<Self> {
        match loc1 {
            LOC_UNSTANDARDIZED => Ok(Standardizer::Unstandardized),
            0 => Ok(Standardizer::PooledCells),
            group if group < LOC_UNSTANDARDIZED => {
                if loc2 == 0 {
                    return Err(WjglmError::InvalidParameter(
                        "LOC2 must be a 1-based condition index when LOC1 selects a group".into(),
                    ));
                }
                Ok(Standardizer::Cell {
                    group: group - 1,
                    condition: loc2 - 1,
                })
            }
            other => Err(WjglmError::InvalidParameter(format!(
                "LOC1 must be 0, 99 or a 1-based group index, got {}",
                other
            ))),
        }
    }

    /// Check a cell selector against the design dimensions.
    pub fn validate(&self, n_groups: usize, n_conditions: usize) -> Result<()> {
        if let Standardizer::Cell { group, condition } = *self {
            if group >= n_groups || condition >= n_conditions {
                return Err(WjglmError::InvalidParameter(format!(
                    "standardizer cell (group {}, condition {}) outside a {} x {} design",
                    group + 1,
                    condition + 1,
                    n_groups,
                    n_conditions
                )));
            }
        }
        Ok(())
    }
}

/// Settings for the effect size and its interval.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSizeConfig {
    /// Number of resamples for the interval.
    pub n_simulations: usize,
    pub standardizer: Standardizer,
    /// Request the robust scaling multiplier (see [`scale_multiplier`]).
    pub scale: bool,
    /// Compute the effect size; without this flag a request is ignored.
    pub enable_experimental: bool,
    pub parallel: bool,
    /// Seed used when no bootstrap seed is configured.
    pub seed: Option<u64>,
}

impl Default for EffectSizeConfig {
    fn default() -> Self {
        Self {
            n_simulations: 999,
            standardizer: Standardizer::default(),
            scale: true,
            enable_experimental: false,
            parallel: true,
            seed: None,
        }
    }
}

/// Point effect size and interval. Fields are NaN when undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSize {
    /// Absolute value of the point estimate.
    pub estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Scaling multiplier applied to the estimate.
    pub multiplier: f64,
}

impl EffectSize {
    pub fn undefined() -> Self {
        Self {
            estimate: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
            multiplier: f64::NAN,
        }
    }
}

/// Scaling multiplier for the effect size.
///
/// Always 1. The Winsorized-variance rescaling for symmetric trimming (a
/// probit-based factor, about 0.642 for 20% trimming) is not implemented.
pub fn scale_multiplier(trimming: Trimming, scale: bool) -> f64 {
    if scale && trimming.fraction() > 0.0 {
        log::debug!(
            "effect size scaling for {:.0}% trimming requested; using multiplier 1",
            trimming.fraction() * 100.0
        );
    }
    1.0
}

/// Standardized contrast `multiplier * (r mu) / stdz`.
///
/// NaN unless `r` has a single row and there is a single condition.
pub fn standardized_effect(
    r: &DMatrix<f64>,
    muhat: &DVector<f64>,
    standardizer: &DMatrix<f64>,
    n_conditions: usize,
    choice: Standardizer,
    multiplier: f64,
) -> f64 {
    if r.nrows() != 1 || n_conditions != 1 {
        return f64::NAN;
    }
    let coeffs = r.row(0);
    let value: f64 = coeffs.iter().zip(muhat.iter()).map(|(c, m)| c * m).sum();

    let stdz = match choice {
        Standardizer::Unstandardized => 1.0,
        Standardizer::PooledCells => {
            let (weighted, total) = coeffs
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(w, t), (cell, c)| {
                    let c2 = c * c;
                    (w + c2 * standardizer[(cell, cell)], t + c2)
                });
            (weighted / total).sqrt()
        }
        Standardizer::Cell { group, condition } => {
            let cell = group * n_conditions + condition;
            if cell >= standardizer.nrows() {
                return f64::NAN;
            }
            let var = standardizer[(cell, cell)];
            if var == 0.0 {
                ZERO_SD_FLOOR
            } else {
                var.sqrt()
            }
        }
    };

    multiplier * value / stdz
}

/// Two-sided percentile interval of the non-NaN `values`.
///
/// With the values sorted in descending order and `k = floor(n * alpha / 2)`,
/// the upper bound is order statistic `k + 1` and the lower bound order
/// statistic `n - k`. `None` when every value is NaN.
pub fn percentile_interval(values: &[f64], alpha: f64) -> Option<(f64, f64)> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| b.total_cmp(a));

    let n = valid.len();
    let k = ((n as f64 * alpha / 2.0).floor() as usize).min(n - 1);
    let upper = valid[k];
    let lower = valid[(n - k).max(1) - 1];
    Some((lower, upper))
}

/// Point effect size on `y` plus its bootstrap percentile interval.
///
/// Resamples are drawn within groups without re-centring. When the point
/// estimate is negative the interval is reflected so that it brackets the
/// reported absolute value.
pub fn bootstrap_effect_size(
    design: &TestDesign,
    y: &DMatrix<f64>,
    alpha: f64,
    config: &EffectSizeConfig,
    stream: &RandomStream,
) -> Result<EffectSize> {
    let n_cond = design.n_conditions;
    if design.df1() != 1 || n_cond != 1 {
        return Ok(EffectSize::undefined());
    }
    config
        .standardizer
        .validate(design.layout.n_groups(), n_cond)?;

    let multiplier = scale_multiplier(design.trimming, config.scale);
    let effect_of = |data: &DMatrix<f64>| -> Result<f64> {
        let (location, dispersion) = design.estimate(data)?;
        Ok(standardized_effect(
            &design.contrast,
            &location.muhat,
            &dispersion.standardizer,
            n_cond,
            config.standardizer,
            multiplier,
        ))
    };

    let simulate = |b: usize| -> Result<f64> {
        let mut rng = stream.rng_for(b as u64);
        let yb = resample(y, &design.layout, &mut rng);
        effect_of(&yb)
    };

    let draws: Vec<f64> = if config.parallel {
        (0..config.n_simulations)
            .into_par_iter()
            .map(simulate)
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..config.n_simulations)
            .map(simulate)
            .collect::<Result<Vec<_>>>()?
    };

    let (lower, upper) = match percentile_interval(&draws, alpha) {
        Some(bounds) => bounds,
        None => {
            log::warn!("every bootstrap effect size is NaN; effect size undefined");
            return Ok(EffectSize::undefined());
        }
    };

    let point = effect_of(y)?;
    let (ci_lower, ci_upper) = if point < 0.0 {
        (-upper, -lower)
    } else {
        (lower, upper)
    };

    Ok(EffectSize {
        estimate: point.abs(),
        ci_lower,
        ci_upper,
        multiplier,
    })
}
