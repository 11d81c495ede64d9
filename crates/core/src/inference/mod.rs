pub mod bootstrap;
pub mod effect_size;
pub mod fdist;
pub mod statistic;

pub use bootstrap::{
    bootstrap_distribution, empirical_p_value, BootstrapConfig, BootstrapDistribution, DegeneratePolicy,
};
pub use effect_size::{
    bootstrap_effect_size, percentile_interval, scale_multiplier, standardized_effect, EffectSize,
    EffectSizeConfig, Standardizer,
};
pub use fdist::{approx_f_cdf, f_survival};
pub use statistic::{contrast_test, ContrastTest};

/// How the closed-form p-value is obtained when no bootstrap is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PValueMethod {
    /// Paulson cube-root approximation with 4-decimal rounding ([`approx_f_cdf`]).
    #[default]
    PaulsonApprox,
    /// Exact F upper tail from `statrs` ([`f_survival`]).
    IncompleteBeta,
}

impl PValueMethod {
    /// Upper-tail probability of `f` under F(`df1`, `df2`).
    pub fn p_value(&self, f: f64, df1: f64, df2: f64) -> f64 {
        match self {
            PValueMethod::PaulsonApprox => 1.0 - approx_f_cdf(f, df1, df2),
            PValueMethod::IncompleteBeta => f_survival(f, df1, df2),
        }
    }
}
