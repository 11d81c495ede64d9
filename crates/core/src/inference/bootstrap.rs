use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::Result;
use crate::model::TestDesign;
use crate::resample::{is_degenerate, recenter, resample, RandomStream};

/// What to do with resamples that contain a zero-variance cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Count them, but keep their statistics in the null distribution.
    #[default]
    Keep,
    /// Treat their statistics as NaN so they drop out of the p-value.
    Exclude,
}

/// Settings for the bootstrap null distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// Number of resamples (NUMSIM).
    pub n_simulations: usize,
    /// Seed of the random stream; `None` or `Some(0)` uses the wall clock.
    pub seed: Option<u64>,
    /// Evaluate resamples on the rayon thread pool.
    pub parallel: bool,
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_simulations: 999,
            seed: None,
            parallel: true,
            degenerate_policy: DegeneratePolicy::Keep,
        }
    }
}

/// Empirical null distribution of the F statistic.
#[derive(Debug, Clone)]
pub struct BootstrapDistribution {
    /// Statistic of every resample, in simulation order.
    pub statistics: Vec<f64>,
    /// Share of non-NaN resampled statistics at or above the observed one.
    pub p_value: f64,
    /// Resamples whose statistic is NaN (after the degenerate policy).
    pub n_nan: usize,
    /// Resamples with a constant column inside some group.
    pub n_degenerate: usize,
}

/// Bootstrap the Welch-James statistic under the null hypothesis.
///
/// Each resample is drawn within groups from `y`, re-centred on the full
/// sample's cell locations `bhat` and refitted with `design`. Resample `b`
/// uses `stream.rng_for(b)`, so the distribution does not depend on whether
/// it is evaluated in parallel.
pub fn bootstrap_distribution(
    design: &TestDesign,
    y: &DMatrix<f64>,
    bhat: &DMatrix<f64>,
    observed: f64,
    config: &BootstrapConfig,
    stream: &RandomStream,
) -> Result<BootstrapDistribution> {
    let layout = &design.layout;

    let simulate = |b: usize| -> Result<(f64, bool)> {
        let mut rng = stream.rng_for(b as u64);
        let yb = resample(y, layout, &mut rng);
        let degenerate = is_degenerate(&yb, layout);
        let centred = recenter(&yb, bhat, layout);
        let fit = design.fit(&centred)?;
        Ok((fit.test.f_statistic, degenerate))
    };

    let draws: Vec<(f64, bool)> = if config.parallel {
        (0..config.n_simulations)
            .into_par_iter()
            .map(simulate)
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..config.n_simulations)
            .map(simulate)
            .collect::<Result<Vec<_>>>()?
    };

    let n_degenerate = draws.iter().filter(|(_, d)| *d).count();
    let statistics: Vec<f64> = draws
        .iter()
        .map(|&(f, degenerate)| {
            if degenerate && config.degenerate_policy == DegeneratePolicy::Exclude {
                f64::NAN
            } else {
                f
            }
        })
        .collect();

    if n_degenerate > 0 && config.degenerate_policy == DegeneratePolicy::Keep {
        log::warn!(
            "{} of {} bootstrap resamples have a zero-variance cell and remain in the null distribution",
            n_degenerate,
            config.n_simulations
        );
    }

    let n_nan = statistics.iter().filter(|f| f.is_nan()).count();
    let p_value = empirical_p_value(&statistics, observed);

    log::info!(
        "bootstrap: {} resamples, {} NaN, {} degenerate, p = {:.4}",
        config.n_simulations,
        n_nan,
        n_degenerate,
        p_value
    );

    Ok(BootstrapDistribution {
        statistics,
        p_value,
        n_nan,
        n_degenerate,
    })
}

/// `#{s >= observed} / (#s - #NaN)`; NaN when no statistic is usable or the
/// observed statistic itself is NaN.
pub fn empirical_p_value(statistics: &[f64], observed: f64) -> f64 {
    if observed.is_nan() {
        return f64::NAN;
    }
    let n_nan = statistics.iter().filter(|s| s.is_nan()).count();
    let valid = statistics.len() - n_nan;
    if valid == 0 {
        return f64::NAN;
    }
    let exceed = statistics.iter().filter(|&&s| s >= observed).count();
    exceed as f64 / valid as f64
}
