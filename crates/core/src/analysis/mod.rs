//! End-to-end Welch-James analysis: point fit, p-value and effect size.

mod result;

pub use result::{BootstrapSummary, WelchJamesResult};

use crate::error::Result;
use crate::inference::{bootstrap_distribution, bootstrap_effect_size};
use crate::model::WelchJamesModel;
use crate::resample::RandomStream;

/// Run a validated model.
///
/// The bootstrap draws from substream 0 and the effect size interval from
/// substream 1 of a single random stream, so both are reproducible from one
/// seed.
pub fn run(model: &WelchJamesModel) -> Result<WelchJamesResult> {
    let design = &model.design;
    let config = &model.config;

    let fit = design.fit(&model.y)?;
    let test = fit.test;
    log::debug!(
        "T = {:.6}, F = {:.6}, df = ({}, {:.4}), A = {:.6}",
        test.t_statistic,
        test.f_statistic,
        test.df1,
        test.df2,
        test.adf_correction
    );

    let seed = config
        .bootstrap
        .as_ref()
        .and_then(|b| b.seed)
        .or_else(|| config.effect_size.as_ref().and_then(|e| e.seed));
    let stream = RandomStream::new(seed);

    let (p_value, bootstrap) = match config.bootstrap {
        Some(ref boot) => {
            let dist = bootstrap_distribution(
                design,
                &model.y,
                &fit.location.bhat,
                test.f_statistic,
                boot,
                &stream.substream(0),
            )?;
            let summary = BootstrapSummary {
                n_simulations: boot.n_simulations,
                seed: stream.seed(),
                statistics: dist.statistics,
                n_nan: dist.n_nan,
                n_degenerate: dist.n_degenerate,
            };
            (dist.p_value, Some(summary))
        }
        None => (
            config
                .p_value_method
                .p_value(test.f_statistic, test.df1, test.df2),
            None,
        ),
    };

    let effect_size = match config.effect_size {
        Some(ref es) if es.enable_experimental => Some(bootstrap_effect_size(
            design,
            &model.y,
            config.alpha,
            es,
            &stream.substream(1),
        )?),
        Some(_) => {
            log::warn!("effect size estimation is disabled; set enable_experimental to compute it");
            None
        }
        None => None,
    };

    Ok(WelchJamesResult {
        location: fit.location,
        dispersion: fit.dispersion,
        test,
        p_value,
        p_value_method: if bootstrap.is_some() {
            "bootstrap".to_string()
        } else {
            format!("{:?}", config.p_value_method)
        },
        bootstrap,
        effect_size,
        group_sizes: design.layout.sizes().to_vec(),
        n_conditions: design.n_conditions,
        n_dropped: model.n_dropped,
    })
}
